/// One-cycle learning rate scheduler
use std::f64::consts::PI;

/// One-cycle scheduler configuration
#[derive(Debug, Clone)]
pub struct OneCycleConfig {
    /// Peak learning rate
    pub max_lr: f64,
    /// Number of epochs in the cycle
    pub epochs: usize,
    /// Optimizer steps per epoch
    pub steps_per_epoch: usize,
    /// Fraction of the cycle spent increasing the learning rate
    pub pct_start: f64,
    /// initial_lr = max_lr / div_factor
    pub div_factor: f64,
    /// min_lr = initial_lr / final_div_factor
    pub final_div_factor: f64,
    /// Adam `beta1` at the learning rate peak
    pub base_momentum: f64,
    /// Adam `beta1` at both ends of the cycle
    pub max_momentum: f64,
}

impl OneCycleConfig {
    /// Cycle with the harness defaults: half warm-up, `div_factor = 10`,
    /// `final_div_factor = 1e4` and momentum between 0.85 and 0.95
    pub fn new(max_lr: f64, epochs: usize, steps_per_epoch: usize) -> Self {
        Self {
            max_lr,
            epochs,
            steps_per_epoch,
            pct_start: 0.5,
            div_factor: 10.0,
            final_div_factor: 1e4,
            base_momentum: 0.85,
            max_momentum: 0.95,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.epochs * self.steps_per_epoch
    }
}

/// One-cycle learning rate scheduler
///
/// Cosine-anneals from `max_lr / div_factor` up to `max_lr` over the first
/// `pct_start` of the steps, then cosine-anneals down to
/// `max_lr / (div_factor * final_div_factor)` by the last step.
///
/// Momentum moves the opposite way over the same phases: from
/// `max_momentum` down to `base_momentum` at the peak and back up.
#[derive(Debug, Clone)]
pub struct OneCycleScheduler {
    config: OneCycleConfig,
    initial_lr: f64,
    min_lr: f64,
    warm_end: f64,
    last_step: f64,
    current_step: usize,
}

fn cosine_anneal(start: f64, end: f64, pct: f64) -> f64 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

impl OneCycleScheduler {
    /// Create new one-cycle scheduler
    pub fn new(config: OneCycleConfig) -> crate::Result<Self> {
        let total_steps = config.total_steps();
        if total_steps == 0 {
            return Err(crate::TrainerError::Config(
                "one-cycle schedule needs at least one step".to_string(),
            ));
        }
        if !config.max_lr.is_finite() || config.max_lr <= 0.0 {
            return Err(crate::TrainerError::Config(format!(
                "max-lr must be positive for the one-cycle schedule, got {}",
                config.max_lr
            )));
        }
        if !(0.0..1.0).contains(&config.base_momentum) || !(0.0..1.0).contains(&config.max_momentum) {
            return Err(crate::TrainerError::Config(format!(
                "momentum bounds must be in [0, 1), got {} and {}",
                config.base_momentum, config.max_momentum
            )));
        }
        if !(0.0..=1.0).contains(&config.pct_start) {
            return Err(crate::TrainerError::Config(format!(
                "pct_start must be in [0, 1], got {}",
                config.pct_start
            )));
        }

        let initial_lr = config.max_lr / config.div_factor;
        let min_lr = initial_lr / config.final_div_factor;
        let warm_end = config.pct_start * total_steps as f64 - 1.0;
        let last_step = total_steps as f64 - 1.0;

        Ok(Self {
            config,
            initial_lr,
            min_lr,
            warm_end,
            last_step,
            current_step: 0,
        })
    }

    /// Get learning rate for current step
    pub fn get_lr(&self) -> f64 {
        self.get_lr_at_step(self.current_step)
    }

    /// Get learning rate for a specific step; steps past the cycle keep the final value
    pub fn get_lr_at_step(&self, step: usize) -> f64 {
        match self.phase(step) {
            (true, pct) => cosine_anneal(self.initial_lr, self.config.max_lr, pct),
            (false, pct) => cosine_anneal(self.config.max_lr, self.min_lr, pct),
        }
    }

    /// Get momentum (Adam `beta1`) for current step
    pub fn get_momentum(&self) -> f64 {
        self.get_momentum_at_step(self.current_step)
    }

    pub fn get_momentum_at_step(&self, step: usize) -> f64 {
        let (base, max) = (self.config.base_momentum, self.config.max_momentum);
        match self.phase(step) {
            (true, pct) => cosine_anneal(max, base, pct),
            (false, pct) => cosine_anneal(base, max, pct),
        }
    }

    /// Whether `step` is in the warm-up phase, and how far through its phase it is
    fn phase(&self, step: usize) -> (bool, f64) {
        let step = (step as f64).min(self.last_step.max(0.0));

        if step <= self.warm_end {
            let pct = if self.warm_end > 0.0 { step / self.warm_end } else { 1.0 };
            (true, pct)
        } else {
            let span = self.last_step - self.warm_end;
            let pct = if span > 0.0 { (step - self.warm_end) / span } else { 1.0 };
            (false, pct)
        }
    }

    /// Step the scheduler (increment step counter)
    pub fn step(&mut self) {
        self.current_step += 1;
    }

    /// Get current step
    pub fn get_step(&self) -> usize {
        self.current_step
    }

    pub fn initial_lr(&self) -> f64 {
        self.initial_lr
    }

    pub fn min_lr(&self) -> f64 {
        self.min_lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_lr: f64, epochs: usize, steps: usize) -> OneCycleScheduler {
        OneCycleScheduler::new(OneCycleConfig::new(max_lr, epochs, steps)).unwrap()
    }

    #[test]
    fn test_starts_at_initial_lr() {
        let scheduler = scheduler(1e-2, 10, 100);
        assert!((scheduler.get_lr() - 1e-3).abs() < 1e-12);
        assert!((scheduler.initial_lr() - 1e-3).abs() < 1e-12);
        assert!((scheduler.min_lr() - 1e-7).abs() < 1e-15);
    }

    #[test]
    fn test_peaks_at_end_of_warm_phase() {
        let odd = scheduler(1.0, 1, 101);
        // warm phase ends at 0.5 * 101 - 1 = 49.5
        let peak = (0..101)
            .map(|s| odd.get_lr_at_step(s))
            .fold(f64::MIN, f64::max);
        assert!(peak <= 1.0 + 1e-12);
        assert!(peak > 0.99);

        let even = scheduler(1.0, 2, 50);
        // 100 steps: warm_end = 49, exactly the peak
        assert!((even.get_lr_at_step(49) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ends_at_min_lr() {
        let scheduler = scheduler(1.0, 4, 25);
        let last = scheduler.get_lr_at_step(99);
        assert!((last - 1e-5).abs() < 1e-12);

        // Past the cycle the final value holds
        assert_eq!(scheduler.get_lr_at_step(500), last);
    }

    #[test]
    fn test_shape_is_up_then_down() {
        let scheduler = scheduler(1.0, 2, 50);
        for step in 1..=49 {
            assert!(scheduler.get_lr_at_step(step) >= scheduler.get_lr_at_step(step - 1));
        }
        for step in 50..100 {
            assert!(scheduler.get_lr_at_step(step) <= scheduler.get_lr_at_step(step - 1));
        }
    }

    #[test]
    fn test_stepping() {
        let mut scheduler = scheduler(1.0, 1, 10);
        let lr0 = scheduler.get_lr();
        let momentum0 = scheduler.get_momentum();

        scheduler.step();
        scheduler.step();
        assert_eq!(scheduler.get_step(), 2);
        assert!(scheduler.get_lr() > lr0);
        assert!(scheduler.get_momentum() < momentum0);
    }

    #[test]
    fn test_momentum_cycles_against_lr() {
        let scheduler = scheduler(1.0, 2, 50);
        assert!((scheduler.get_momentum_at_step(0) - 0.95).abs() < 1e-12);
        assert!((scheduler.get_momentum_at_step(49) - 0.85).abs() < 1e-12);
        assert!((scheduler.get_momentum_at_step(99) - 0.95).abs() < 1e-12);
        assert!((scheduler.get_momentum_at_step(500) - 0.95).abs() < 1e-12);

        for step in 1..=49 {
            assert!(scheduler.get_momentum_at_step(step) <= scheduler.get_momentum_at_step(step - 1));
        }
        for step in 50..100 {
            assert!(scheduler.get_momentum_at_step(step) >= scheduler.get_momentum_at_step(step - 1));
        }
    }

    #[test]
    fn test_single_step_cycle() {
        let scheduler = scheduler(1.0, 1, 1);
        assert!(scheduler.get_lr_at_step(0).is_finite());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(OneCycleScheduler::new(OneCycleConfig::new(1.0, 0, 10)).is_err());
        assert!(OneCycleScheduler::new(OneCycleConfig::new(1.0, 5, 0)).is_err());
        assert!(OneCycleScheduler::new(OneCycleConfig::new(-1.0, 5, 10)).is_err());

        let mut bad_momentum = OneCycleConfig::new(1.0, 5, 10);
        bad_momentum.max_momentum = 1.0;
        assert!(OneCycleScheduler::new(bad_momentum).is_err());
    }
}
