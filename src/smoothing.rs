//! Two-stage smoothing of the raw score: an EMA absorbs single-tick noise,
//! then a per-tick rate clamp bounds how fast the visible score can move.

use crate::config::ScoreConfig;

#[derive(Debug, Clone)]
pub struct ScoreSmoother {
    alpha: f64,
    min_step: f64,
    max_step: f64,
    ema: f64,
    current: f64,
}

impl ScoreSmoother {
    pub fn new(start: f64, alpha: f64, min_step: f64, max_step: f64) -> Self {
        Self {
            alpha,
            min_step,
            max_step,
            ema: start,
            current: start,
        }
    }

    /// Starts at the baseline with the configured alpha and clamp.
    pub fn from_config(cfg: &ScoreConfig) -> Self {
        Self::new(
            cfg.baseline,
            cfg.ema_alpha(),
            cfg.clamp.min_per_second,
            cfg.clamp.max_per_second,
        )
    }

    /// Fold one raw observation in and return the new visible score.
    pub fn update(&mut self, raw: f64) -> f64 {
        if self.ema.is_nan() {
            self.ema = raw;
        }
        self.ema += self.alpha * (raw - self.ema);

        let delta = (self.ema - self.current).clamp(self.min_step, self.max_step);
        self.current = (self.current + delta).clamp(0.0, 100.0);
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn ema(&self) -> f64 {
        self.ema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_rate_limited() {
        let mut s = ScoreSmoother::new(95.0, 1.0, -5.0, 3.0);
        assert_eq!(s.update(0.0), 90.0);
        assert_eq!(s.update(0.0), 85.0);
        assert_eq!(s.ema(), 0.0);
    }

    #[test]
    fn recovery_is_slower_than_drop() {
        let mut s = ScoreSmoother::new(50.0, 1.0, -5.0, 3.0);
        assert_eq!(s.update(100.0), 53.0);
    }

    #[test]
    fn converges_to_steady_raw() {
        let mut s = ScoreSmoother::new(95.0, 0.2, -5.0, 3.0);
        for _ in 0..500 {
            s.update(60.0);
        }
        assert!((s.current() - 60.0).abs() < 1e-6);
    }

    #[test]
    fn nan_ema_resets_to_raw() {
        let mut s = ScoreSmoother::new(f64::NAN, 0.5, -5.0, 3.0);
        s.current = 70.0;
        assert_eq!(s.update(70.0), 70.0);
        assert_eq!(s.ema(), 70.0);
    }
}
