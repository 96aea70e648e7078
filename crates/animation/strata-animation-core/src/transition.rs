//! Time-windowed transition rules.

use crate::error::ConfigurationError;
use crate::interp::BlendCurve;

/// Window of state-local time in which a rule may fire. `None` edges are open.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<f32>,
    pub end: Option<f32>,
}

impl TimeWindow {
    pub const OPEN: TimeWindow = TimeWindow {
        start: None,
        end: None,
    };

    pub fn new(start: Option<f32>, end: Option<f32>) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t <= e)
    }

    /// Bounds must be finite, ordered and inside `[0, duration)` when the
    /// owning state has a duration.
    pub fn validate(&self, duration: Option<f32>) -> Result<(), ConfigurationError> {
        let invalid = || ConfigurationError::InvalidWindow {
            start: self.start,
            end: self.end,
            duration,
        };
        for bound in [self.start, self.end].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(invalid());
            }
            if let Some(d) = duration {
                if bound >= d {
                    return Err(invalid());
                }
            }
        }
        if let (Some(s), Some(e)) = (self.start, self.end) {
            if s > e {
                return Err(invalid());
            }
        }
        Ok(())
    }
}

/// How the layer moves to the target state.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TransitionKind {
    /// Hard cut.
    Immediate,
    /// Cross-fade; the target restarts at 0.
    Fade { duration: f32, curve: BlendCurve },
    /// Cross-fade; the target's start phase follows [`crate::config::SyncFadePhase`].
    SyncFade { duration: f32, curve: BlendCurve },
}

impl TransitionKind {
    /// Fade length and curve, or `None` for immediate cuts.
    pub fn fade(&self) -> Option<(f32, BlendCurve)> {
        match *self {
            TransitionKind::Immediate => None,
            TransitionKind::Fade { duration, curve }
            | TransitionKind::SyncFade { duration, curve } => Some((duration, curve)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransitionKind::Immediate => "immediate",
            TransitionKind::Fade { .. } => "fade",
            TransitionKind::SyncFade { .. } => "syncfade",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRule {
    pub window: TimeWindow,
    pub kind: TransitionKind,
    pub target: String,
}

impl TransitionRule {
    /// Immediate rule with an open window.
    pub fn immediate(target: impl Into<String>) -> Self {
        Self {
            window: TimeWindow::OPEN,
            kind: TransitionKind::Immediate,
            target: target.into(),
        }
    }

    pub fn validate(&self, duration: Option<f32>) -> Result<(), ConfigurationError> {
        self.window.validate(duration)?;
        if let Some((fade, _)) = self.kind.fade() {
            if !fade.is_finite() || fade <= 0.0 {
                return Err(ConfigurationError::transition(format!(
                    "fade time must be > 0 (target '{}', got {fade})",
                    self.target
                )));
            }
        }
        if self.target.is_empty() {
            return Err(ConfigurationError::transition("empty target state"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_edges_accept_any_time() {
        assert!(TimeWindow::OPEN.contains(-5.0));
        assert!(TimeWindow::OPEN.contains(1e6));
        let w = TimeWindow::new(Some(0.2), None);
        assert!(!w.contains(0.1));
        assert!(w.contains(0.2));
        assert!(w.contains(9.0));
    }

    #[test]
    fn window_bounds_are_checked_against_duration() {
        assert!(TimeWindow::new(Some(0.2), Some(0.5)).validate(Some(1.0)).is_ok());
        assert!(TimeWindow::new(Some(0.5), Some(0.2)).validate(Some(1.0)).is_err());
        assert!(TimeWindow::new(None, Some(1.0)).validate(Some(1.0)).is_err());
        assert!(TimeWindow::new(Some(-0.1), None).validate(None).is_err());
        assert!(TimeWindow::new(Some(3.0), None).validate(None).is_ok());
    }

    #[test]
    fn fades_need_positive_length() {
        let rule = TransitionRule {
            window: TimeWindow::OPEN,
            kind: TransitionKind::SyncFade {
                duration: 0.0,
                curve: BlendCurve::Linear,
            },
            target: "run_anim".into(),
        };
        assert!(matches!(
            rule.validate(Some(1.0)),
            Err(ConfigurationError::InvalidTransition { .. })
        ));
        assert!(TransitionRule::immediate("walk_anim").validate(Some(1.0)).is_ok());
    }
}
