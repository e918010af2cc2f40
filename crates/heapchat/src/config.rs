//! Widget configuration and identity data.

use crate::{WidgetError, WidgetResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Screen corner the launcher and surface are anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BottomRight => "bottom-right",
            Self::BottomLeft => "bottom-left",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = WidgetError;

    fn from_str(s: &str) -> WidgetResult<Self> {
        match s {
            "bottom-right" => Ok(Self::BottomRight),
            "bottom-left" => Ok(Self::BottomLeft),
            other => Err(WidgetError::InvalidValue {
                field: "position",
                value: other.to_string(),
            }),
        }
    }
}

/// Arguments to `configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Avatar shown for the support side of the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_toggle_button: Option<bool>,
}

impl WidgetConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            position: None,
            support_image: None,
            show_toggle_button: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_support_image(mut self, url: impl Into<String>) -> Self {
        self.support_image = Some(url.into());
        self
    }

    pub fn with_toggle_button(mut self, visible: bool) -> Self {
        self.show_toggle_button = Some(visible);
        self
    }

    /// Position with the bottom-right default applied.
    pub fn resolved_position(&self) -> Position {
        self.position.unwrap_or_default()
    }

    /// The launcher is visible unless explicitly turned off.
    pub fn toggle_button_visible(&self) -> bool {
        self.show_toggle_button != Some(false)
    }
}

/// Customer identity forwarded with CUSTOMER_DATA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = WidgetConfig::new("k1");
        assert_eq!(config.resolved_position(), Position::BottomRight);
        assert!(config.toggle_button_visible());

        let hidden = WidgetConfig::new("k1").with_toggle_button(false);
        assert!(!hidden.toggle_button_visible());
    }

    #[test]
    fn test_config_wire_shape() {
        let config: WidgetConfig = serde_json::from_value(json!({
            "apiKey": "k1",
            "position": "bottom-left",
            "showToggleButton": false
        }))
        .unwrap();

        assert_eq!(config.api_key, "k1");
        assert_eq!(config.position, Some(Position::BottomLeft));
        assert_eq!(config.support_image, None);
        assert!(!config.toggle_button_visible());
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("bottom-left".parse::<Position>().unwrap(), Position::BottomLeft);
        assert!(matches!(
            "top-left".parse::<Position>(),
            Err(WidgetError::InvalidValue { field: "position", .. })
        ));
        assert_eq!(Position::BottomRight.to_string(), "bottom-right");
    }

    #[test]
    fn test_customer_data_omits_missing_fields() {
        let data = CustomerData {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({ "email": "ada@example.com" })
        );
    }
}
