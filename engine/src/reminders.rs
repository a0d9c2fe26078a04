//! In-memory supplement reminder plan.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DoseTime {
    Morning,
    Lunch,
    Evening,
}

impl DoseTime {
    pub const ALL: [Self; 3] = [Self::Morning, Self::Lunch, Self::Evening];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Morning => "아침",
            Self::Lunch => "점심",
            Self::Evening => "저녁",
        }
    }
}

impl fmt::Display for DoseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DoseTime {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "아침" => Ok(Self::Morning),
            "점심" => Ok(Self::Lunch),
            "저녁" => Ok(Self::Evening),
            other if other.eq_ignore_ascii_case("morning") => Ok(Self::Morning),
            other if other.eq_ignore_ascii_case("lunch") => Ok(Self::Lunch),
            other if other.eq_ignore_ascii_case("evening") => Ok(Self::Evening),
            other => Err(format!(
                "unknown dose time '{other}' (expected morning, lunch or evening)"
            )),
        }
    }
}

/// Dose times per recommended supplement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderPlan {
    items: Vec<(String, BTreeSet<DoseTime>)>,
    saved: bool,
}

impl ReminderPlan {
    /// Plan with no times selected, in recommendation order.
    #[must_use]
    pub fn from_supplements<I, S>(supplements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<(String, BTreeSet<DoseTime>)> = Vec::new();
        for name in supplements {
            let name = name.into();
            if !items.iter().any(|(existing, _)| *existing == name) {
                items.push((name, BTreeSet::new()));
            }
        }
        Self {
            items,
            saved: false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Add or remove `time` for `item`. Returns `false` for unknown items.
    pub fn toggle(&mut self, item: &str, time: DoseTime) -> bool {
        let Some((_, times)) = self.items.iter_mut().find(|(name, _)| name == item) else {
            return false;
        };
        if !times.remove(&time) {
            times.insert(time);
        }
        self.saved = false;
        true
    }

    /// Items in recommendation order with their times in day order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Vec<DoseTime>)> {
        self.items
            .iter()
            .map(|(name, times)| (name.as_str(), times.iter().copied().collect()))
    }

    /// Mark the plan saved. Nothing is persisted.
    pub fn save(&mut self) {
        for (name, times) in &self.items {
            let labels: Vec<&str> = times.iter().map(|time| time.label()).collect();
            tracing::info!(supplement = %name, times = ?labels, "Reminder saved");
        }
        self.saved = true;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.saved = false;
    }
}
