//! Patience-based early stopping on validation loss

/// Outcome of observing one epoch's validation loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Strictly below the best loss so far; counter reset
    Improved,
    /// No improvement, patience not yet exhausted
    Stalled,
    /// No improvement for `patience` consecutive epochs
    Stop,
}

/// Tracks the best validation loss and consecutive non-improving epochs
///
/// A loss improves only when strictly lower than the best seen; equal or NaN
/// losses count against patience.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    /// `None` disables stopping; losses are still tracked
    patience: Option<usize>,
    best_loss: f64,
    no_improve_count: usize,
}

impl EarlyStopping {
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            no_improve_count: 0,
        }
    }

    /// Build from a config patience where `-1` disables stopping
    pub fn from_patience(patience: i64) -> Self {
        Self::new(usize::try_from(patience).ok().filter(|&p| p > 0))
    }

    /// Resume with a previously recorded best loss
    pub fn with_best_loss(mut self, best_loss: f64) -> Self {
        self.best_loss = best_loss;
        self
    }

    pub fn observe(&mut self, val_loss: f64) -> Verdict {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.no_improve_count = 0;
            return Verdict::Improved;
        }

        self.no_improve_count += 1;
        match self.patience {
            Some(patience) if self.no_improve_count >= patience => Verdict::Stop,
            _ => Verdict::Stalled,
        }
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn no_improve_count(&self) -> usize {
        self.no_improve_count
    }

    pub fn patience(&self) -> Option<usize> {
        self.patience
    }
}
