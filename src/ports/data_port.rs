//! Bar source port trait.

use crate::domain::bar::BarSeries;
use crate::domain::error::SimError;

pub trait BarSource {
    /// Load and validate the whole series.
    fn load_bars(&self) -> Result<BarSeries, SimError>;
}
