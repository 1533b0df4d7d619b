//! Container appearance and numbering preferences

use serde::{Deserialize, Serialize};

/// Colors the host accepts for a contextual identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)] // variants are the host's names
pub enum ContainerColor {
    Blue,
    Turquoise,
    Green,
    Yellow,
    Orange,
    Red,
    Pink,
    Purple,
    Toolbar,
}

impl ContainerColor {
    /// Every color, in host order
    pub const ALL: [ContainerColor; 9] = [
        Self::Blue,
        Self::Turquoise,
        Self::Green,
        Self::Yellow,
        Self::Orange,
        Self::Red,
        Self::Pink,
        Self::Purple,
        Self::Toolbar,
    ];

    /// Host-side name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Turquoise => "turquoise",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::Pink => "pink",
            Self::Purple => "purple",
            Self::Toolbar => "toolbar",
        }
    }
}

/// Icons the host accepts for a contextual identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)] // variants are the host's names
pub enum ContainerIcon {
    Fingerprint,
    Briefcase,
    Dollar,
    Cart,
    Circle,
    Gift,
    Vacation,
    Food,
    Fruit,
    Pet,
    Tree,
    Chill,
    Fence,
}

impl ContainerIcon {
    /// Every icon, in host order
    pub const ALL: [ContainerIcon; 13] = [
        Self::Fingerprint,
        Self::Briefcase,
        Self::Dollar,
        Self::Cart,
        Self::Circle,
        Self::Gift,
        Self::Vacation,
        Self::Food,
        Self::Fruit,
        Self::Pet,
        Self::Tree,
        Self::Chill,
        Self::Fence,
    ];

    /// Host-side name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fingerprint => "fingerprint",
            Self::Briefcase => "briefcase",
            Self::Dollar => "dollar",
            Self::Cart => "cart",
            Self::Circle => "circle",
            Self::Gift => "gift",
            Self::Vacation => "vacation",
            Self::Food => "food",
            Self::Fruit => "fruit",
            Self::Pet => "pet",
            Self::Tree => "tree",
            Self::Chill => "chill",
            Self::Fence => "fence",
        }
    }
}

/// How container sequence numbers are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberMode {
    /// Counter never resets
    #[default]
    Keep,
    /// Counter resets when the browser starts
    KeepUntilRestart,
    /// Lowest number not held by a live container
    Reuse,
    /// Numbers are tracked but not shown in the name
    Hide,
}

impl NumberMode {
    /// Whether the number is part of the visible container name
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Hide)
    }
}

/// Defaults applied to every new temporary container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerPreferences {
    /// Prefix of every container name, followed by the number
    pub name_prefix: String,
    /// Color used when `color_random` is off
    pub color: ContainerColor,
    /// Pick a random color per container
    pub color_random: bool,
    /// Colors never picked at random
    pub color_random_excluded: Vec<ContainerColor>,
    /// Icon used when `icon_random` is off
    pub icon: ContainerIcon,
    /// Pick a random icon per container
    pub icon_random: bool,
    /// Icons never picked at random
    pub icon_random_excluded: Vec<ContainerIcon>,
    /// How container numbers are handed out
    pub number_mode: NumberMode,
    /// Delay in milliseconds between the last tab closing and removal
    pub removal: u64,
}

impl ContainerPreferences {
    /// Colors eligible for random selection
    #[must_use]
    pub fn color_candidates(&self) -> Vec<ContainerColor> {
        ContainerColor::ALL
            .into_iter()
            .filter(|c| !self.color_random_excluded.contains(c))
            .collect()
    }

    /// Icons eligible for random selection
    #[must_use]
    pub fn icon_candidates(&self) -> Vec<ContainerIcon> {
        ContainerIcon::ALL
            .into_iter()
            .filter(|i| !self.icon_random_excluded.contains(i))
            .collect()
    }
}

impl Default for ContainerPreferences {
    fn default() -> Self {
        Self {
            name_prefix: "tmp".to_string(),
            color: ContainerColor::Red,
            color_random: false,
            color_random_excluded: Vec::new(),
            icon: ContainerIcon::Circle,
            icon_random: false,
            icon_random_excluded: Vec::new(),
            number_mode: NumberMode::Keep,
            removal: 900_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_mode_wire_names() {
        let mode: NumberMode = serde_json::from_str("\"keepuntilrestart\"").unwrap();
        assert_eq!(mode, NumberMode::KeepUntilRestart);
        assert!(!NumberMode::Hide.is_visible());
        assert!(NumberMode::Reuse.is_visible());
    }

    #[test]
    fn candidates_respect_exclusions() {
        let prefs = ContainerPreferences {
            color_random_excluded: vec![ContainerColor::Red, ContainerColor::Toolbar],
            icon_random_excluded: vec![ContainerIcon::Fence],
            ..ContainerPreferences::default()
        };

        let colors = prefs.color_candidates();
        assert_eq!(colors.len(), ContainerColor::ALL.len() - 2);
        assert!(!colors.contains(&ContainerColor::Red));

        let icons = prefs.icon_candidates();
        assert!(!icons.contains(&ContainerIcon::Fence));
    }

    #[test]
    fn as_str_matches_serde() {
        for color in ContainerColor::ALL {
            let json = serde_json::to_string(&color).unwrap();
            assert_eq!(json, format!("\"{}\"", color.as_str()));
        }
        for icon in ContainerIcon::ALL {
            let json = serde_json::to_string(&icon).unwrap();
            assert_eq!(json, format!("\"{}\"", icon.as_str()));
        }
    }
}
