use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Text,
    Checkbox,
    Image,
    Icon,
    Link,
    Unknown,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Button => "button",
            ElementType::Input => "input",
            ElementType::Text => "text",
            ElementType::Checkbox => "checkbox",
            ElementType::Image => "image",
            ElementType::Icon => "icon",
            ElementType::Link => "link",
            ElementType::Unknown => "unknown",
        }
    }

    /// Lenient mapping from whatever type string the VLM emits; anything
    /// unrecognized lands on `Unknown` rather than failing the parse.
    pub fn from_loose(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "button" => ElementType::Button,
            "input" | "input_field" | "textfield" | "edit_text" => ElementType::Input,
            "text" | "label" => ElementType::Text,
            "checkbox" => ElementType::Checkbox,
            "image" => ElementType::Image,
            "icon" => ElementType::Icon,
            "link" => ElementType::Link,
            _ => ElementType::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for ElementType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(ElementType::from_loose(&label))
    }
}

/// One perceived interactive region. Fresh per screenshot; element
/// identity is not preserved between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIElement {
    #[serde(rename = "type", default = "default_element_type")]
    pub element_type: ElementType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(default = "default_clickable")]
    pub clickable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_element_type() -> ElementType {
    ElementType::Unknown
}

fn default_clickable() -> bool {
    true
}

fn default_app_name() -> String {
    "Unknown".into()
}

/// One analyzed screen snapshot; read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIState {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub screen_description: String,
    #[serde(default)]
    pub elements: Vec<UIElement>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub popup_visible: bool,
    #[serde(default)]
    pub available_actions: Vec<String>,
    /// Raw model response, kept for debugging; excluded from the planner context.
    #[serde(skip)]
    pub raw_response: Option<String>,
}

impl UIState {
    /// Degraded state carrying a failure in-band so the loop can continue.
    pub fn degraded(
        screen_description: impl Into<String>,
        error_message: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            app_name: "Unknown".into(),
            screen_description: screen_description.into(),
            elements: Vec::new(),
            error_message: Some(error_message.into()),
            popup_visible: false,
            available_actions: Vec::new(),
            raw_response,
        }
    }

    /// Short summary used in the action history.
    pub fn summary(&self) -> String {
        let desc: String = self.screen_description.chars().take(100).collect();
        format!("{}: {}", self.app_name, desc)
    }
}

/// Find an element by visible text, optionally by substring.
pub fn find_element_by_text<'a>(
    state: &'a UIState,
    text: &str,
    partial_match: bool,
) -> Option<&'a UIElement> {
    let needle = text.to_lowercase();
    state.elements.iter().find(|e| {
        let haystack = e.text.to_lowercase();
        if partial_match {
            haystack.contains(&needle)
        } else {
            haystack == needle
        }
    })
}

/// All elements of a given type.
pub fn find_elements_by_type(state: &UIState, element_type: ElementType) -> Vec<&UIElement> {
    state
        .elements
        .iter()
        .filter(|e| e.element_type == element_type)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> UIState {
        UIState {
            app_name: "Play Store".into(),
            screen_description: "App listing for WhatsApp".into(),
            elements: vec![
                UIElement {
                    element_type: ElementType::Button,
                    text: "Install".into(),
                    x: 540,
                    y: 1800,
                    width: None,
                    height: None,
                    clickable: true,
                    description: None,
                },
                UIElement {
                    element_type: ElementType::Input,
                    text: "Search apps".into(),
                    x: 540,
                    y: 150,
                    width: Some(900),
                    height: Some(80),
                    clickable: true,
                    description: None,
                },
            ],
            error_message: None,
            popup_visible: false,
            available_actions: vec!["tap Install".into()],
            raw_response: None,
        }
    }

    #[test]
    fn finds_element_by_partial_text() {
        let state = sample_state();
        let found = find_element_by_text(&state, "install", true).unwrap();
        assert_eq!(found.x, 540);
        assert_eq!(found.y, 1800);
    }

    #[test]
    fn exact_match_requires_full_text() {
        let state = sample_state();
        assert!(find_element_by_text(&state, "Inst", false).is_none());
        assert!(find_element_by_text(&state, "INSTALL", false).is_some());
    }

    #[test]
    fn filters_by_type() {
        let state = sample_state();
        let inputs = find_elements_by_type(&state, ElementType::Input);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].text, "Search apps");
    }

    #[test]
    fn summary_truncates_long_descriptions() {
        let mut state = sample_state();
        state.screen_description = "x".repeat(300);
        let summary = state.summary();
        assert!(summary.starts_with("Play Store: "));
        assert_eq!(summary.len(), "Play Store: ".len() + 100);
    }

    #[test]
    fn element_deserializes_with_aliases_and_defaults() {
        let element: UIElement =
            serde_json::from_str(r#"{"type": "input_field", "text": "Email", "x": 10, "y": 20}"#)
                .unwrap();
        assert_eq!(element.element_type, ElementType::Input);
        assert!(element.clickable);

        let unknown: UIElement =
            serde_json::from_str(r#"{"type": "carousel", "text": "", "x": 0, "y": 0}"#).unwrap();
        assert_eq!(unknown.element_type, ElementType::Unknown);
    }
}
