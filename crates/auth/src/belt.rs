//! Belt ranks and their badge colors.

use serde::{Deserialize, Serialize};

/// Martial-arts grading attached to a student identity.
///
/// Serialized with the backend's names (`Branca`, `Azul`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BeltRank {
    #[default]
    #[serde(rename = "Branca")]
    White,
    #[serde(rename = "Azul")]
    Blue,
    #[serde(rename = "Roxa")]
    Purple,
    #[serde(rename = "Marrom")]
    Brown,
    #[serde(rename = "Preta")]
    Black,
}

impl BeltRank {
    /// Total parse of a backend belt name. Unknown names fall back to White.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "Branca" => BeltRank::White,
            "Azul" => BeltRank::Blue,
            "Roxa" => BeltRank::Purple,
            "Marrom" => BeltRank::Brown,
            "Preta" => BeltRank::Black,
            _ => BeltRank::White,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BeltRank::White => "Branca",
            BeltRank::Blue => "Azul",
            BeltRank::Purple => "Roxa",
            BeltRank::Brown => "Marrom",
            BeltRank::Black => "Preta",
        }
    }

    /// Badge background color.
    pub fn color(self) -> &'static str {
        match self {
            BeltRank::White => "#FFFFFF",
            BeltRank::Blue => "#1E88E5",
            BeltRank::Purple => "#8E24AA",
            BeltRank::Brown => "#795548",
            BeltRank::Black => "#212121",
        }
    }

    /// Text color readable on top of [`color`](Self::color).
    pub fn text_color(self) -> &'static str {
        match self {
            BeltRank::White => "#333",
            _ => "white",
        }
    }
}

impl core::fmt::Display for BeltRank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Badge color for a raw belt name.
pub fn belt_color(name: &str) -> &'static str {
    BeltRank::from_wire(name).color()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_lookup() {
        assert_eq!(belt_color("Roxa"), "#8E24AA");
        assert_eq!(belt_color("Preta"), "#212121");
        assert_eq!(belt_color("Unknown"), "#FFFFFF");
        assert_eq!(belt_color(""), "#FFFFFF");
    }

    #[test]
    fn wire_names_round_trip() {
        for belt in [
            BeltRank::White,
            BeltRank::Blue,
            BeltRank::Purple,
            BeltRank::Brown,
            BeltRank::Black,
        ] {
            assert_eq!(BeltRank::from_wire(belt.label()), belt);
            let json = serde_json::to_value(belt).unwrap();
            assert_eq!(json, serde_json::json!(belt.label()));
        }
    }

    #[test]
    fn white_badge_uses_dark_text() {
        assert_eq!(BeltRank::White.text_color(), "#333");
        assert_eq!(BeltRank::Brown.text_color(), "white");
    }
}
