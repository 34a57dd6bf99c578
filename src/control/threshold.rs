//! Water-level threshold classification
//!
//! Percentage of the per-device threshold, mapped to one of five alarm bands.
//! Pure arithmetic; the engine decides what to do with the band.

use crate::sinks::Severity;

/// Alarm band for one reading relative to the device threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Band {
    None,
    /// >= 30% of threshold
    Attention,
    /// >= 50%
    Caution,
    /// >= 70%
    Warning,
    /// >= 80%
    CriticalSevere,
    /// >= 90%
    CriticalEvacuate,
}

impl Band {
    /// Band boundaries, highest first
    pub fn classify(value: f64, threshold: f64) -> Band {
        if threshold <= 0.0 {
            return Band::None;
        }
        let ratio = value / threshold;
        if ratio >= 0.9 {
            Band::CriticalEvacuate
        } else if ratio >= 0.8 {
            Band::CriticalSevere
        } else if ratio >= 0.7 {
            Band::Warning
        } else if ratio >= 0.5 {
            Band::Caution
        } else if ratio >= 0.3 {
            Band::Attention
        } else {
            Band::None
        }
    }

    /// Only warning and above raise records in the event log
    pub fn raises_event(self) -> bool {
        self >= Band::Warning
    }

    pub fn severity(self) -> Severity {
        match self {
            Band::None => Severity::Info,
            Band::Attention => Severity::Attention,
            Band::Caution => Severity::Caution,
            Band::Warning => Severity::Warning,
            Band::CriticalSevere => Severity::CriticalSevere,
            Band::CriticalEvacuate => Severity::CriticalEvacuate,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::None => "normal",
            Band::Attention => "attention",
            Band::Caution => "caution",
            Band::Warning => "warning",
            Band::CriticalSevere => "critical-severe",
            Band::CriticalEvacuate => "critical-evacuate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        let t = 100.0;
        assert_eq!(Band::classify(29.9, t), Band::None);
        assert_eq!(Band::classify(30.0, t), Band::Attention);
        assert_eq!(Band::classify(49.9, t), Band::Attention);
        assert_eq!(Band::classify(50.0, t), Band::Caution);
        assert_eq!(Band::classify(69.9, t), Band::Caution);
        assert_eq!(Band::classify(70.0, t), Band::Warning);
        assert_eq!(Band::classify(79.9, t), Band::Warning);
        assert_eq!(Band::classify(80.0, t), Band::CriticalSevere);
        assert_eq!(Band::classify(89.9, t), Band::CriticalSevere);
        assert_eq!(Band::classify(90.0, t), Band::CriticalEvacuate);
        assert_eq!(Band::classify(150.0, t), Band::CriticalEvacuate);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let mut last = Band::None;
        for value in 0..=120 {
            let band = Band::classify(f64::from(value), 100.0);
            assert!(band >= last, "band regressed at value {value}");
            last = band;
        }
    }

    #[test]
    fn test_degenerate_threshold() {
        assert_eq!(Band::classify(50.0, 0.0), Band::None);
        assert_eq!(Band::classify(50.0, -10.0), Band::None);
    }

    #[test]
    fn test_event_worthiness() {
        assert!(!Band::Attention.raises_event());
        assert!(!Band::Caution.raises_event());
        assert!(Band::Warning.raises_event());
        assert!(Band::CriticalSevere.raises_event());
        assert!(Band::CriticalEvacuate.raises_event());
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Band::Warning.severity(), Severity::Warning);
        assert_eq!(Band::CriticalEvacuate.severity(), Severity::CriticalEvacuate);
    }
}
