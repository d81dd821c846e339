/// Friendly key names the planner is allowed to emit, mapped to Android
/// keycodes. Names already in `KEYCODE_*` form (or raw numbers) pass
/// through unchanged so the table stays extensible without being a wall.
pub fn keycode_for(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "back" => "KEYCODE_BACK".into(),
        "home" => "KEYCODE_HOME".into(),
        "enter" => "KEYCODE_ENTER".into(),
        "delete" | "del" => "KEYCODE_DEL".into(),
        "tab" => "KEYCODE_TAB".into(),
        "space" => "KEYCODE_SPACE".into(),
        "menu" => "KEYCODE_MENU".into(),
        "search" => "KEYCODE_SEARCH".into(),
        "power" => "KEYCODE_POWER".into(),
        "camera" => "KEYCODE_CAMERA".into(),
        "volume_up" => "KEYCODE_VOLUME_UP".into(),
        "volume_down" => "KEYCODE_VOLUME_DOWN".into(),
        _ => name.to_string(),
    }
}
