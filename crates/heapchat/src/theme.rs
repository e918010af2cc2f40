//! Theme state.
//!
//! A theme is a flat set of optional colors, one dark-mode and one
//! light-mode value per slot. `set_theme` patches are themes too: present
//! fields overwrite, absent fields are kept.

use crate::{WidgetError, WidgetResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! theme {
    ($($field:ident),* $(,)?) => {
        /// Widget colors. Every field is optional so the same type carries
        /// both full state and partial patches.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct Theme {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<String>,
            )*
        }

        impl Theme {
            /// Overwrite every field that `patch` sets.
            pub fn merge(&mut self, patch: &Theme) {
                $(
                    if let Some(value) = &patch.$field {
                        self.$field = Some(value.clone());
                    }
                )*
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }
        }
    };
}

theme!(
    primary_color,
    primary_text_color,
    secondary_color,
    secondary_text_color,
    background_color,
    background_text_color,
    border_color,
    border_text_color,
    icon_color,
    icon_text_color,
    header_color,
    header_indicator_color,
    header_text_color,
    destructive,
    destructive_text,
    primary_color_light,
    primary_text_color_light,
    secondary_color_light,
    secondary_text_color_light,
    background_color_light,
    background_text_color_light,
    border_color_light,
    border_text_color_light,
    icon_color_light,
    icon_text_color_light,
    header_color_light,
    header_indicator_color_light,
    header_text_color_light,
    destructive_light,
    destructive_text_light,
);

impl Theme {
    /// Colors the hosted widget starts with.
    pub fn hosted_default() -> Self {
        let color = |hex: &str| Some(hex.to_string());
        Self {
            primary_color: color("#2563eb"),
            primary_text_color: color("#ffffff"),
            secondary_color: color("#27272a"),
            secondary_text_color: color("#666666"),
            primary_color_light: color("#2563eb"),
            primary_text_color_light: color("#ffffff"),
            secondary_color_light: color("#27272a"),
            secondary_text_color_light: color("#666666"),
            ..Default::default()
        }
    }
}

/// Which palette the surface should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    /// Follow the viewer's OS preference.
    #[default]
    System,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = WidgetError;

    fn from_str(s: &str) -> WidgetResult<Self> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(WidgetError::InvalidValue {
                field: "theme mode",
                value: other.to_string(),
            }),
        }
    }
}
