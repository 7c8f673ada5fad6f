//! Speed ratio to gear.

use egs_common::control_unit::config::GearboxConfig;
use egs_common::control_unit::gear::{Gear, GearRatioTable, GearTableError};

#[derive(Debug, Clone)]
pub struct GearClassifier {
    table: GearRatioTable,
    stationary_rpm: u32,
}

impl GearClassifier {
    pub fn new(table: GearRatioTable, stationary_rpm: u32) -> Self {
        Self {
            table,
            stationary_rpm,
        }
    }

    pub fn from_config(config: &GearboxConfig) -> Result<Self, GearTableError> {
        let table = GearRatioTable::for_variant(config.variant, config.ratio_tolerance)?;
        Ok(Self::new(table, config.stationary_rpm))
    }

    pub fn table(&self) -> &GearRatioTable {
        &self.table
    }

    #[inline]
    pub fn is_stationary(&self, output_rpm: u32) -> bool {
        output_rpm <= self.stationary_rpm
    }

    /// Gear whose ratio window contains `input_rpm / output_rpm`.
    ///
    /// `None` when the output shaft is (nearly) stopped or no window
    /// matches. `reverse` selects the reverse windows.
    pub fn classify(&self, input_rpm: u32, output_rpm: u32, reverse: bool) -> Option<Gear> {
        if self.is_stationary(output_rpm) || output_rpm == 0 {
            return None;
        }
        let ratio = input_rpm as f64 / output_rpm as f64;
        self.table.lookup(ratio, reverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egs_common::control_unit::gear::TransmissionVariant;
    use proptest::prelude::*;

    fn classifier() -> GearClassifier {
        GearClassifier::from_config(&GearboxConfig::default()).unwrap()
    }

    #[test]
    fn second_gear_from_bus_speeds() {
        assert_eq!(classifier().classify(2000, 1008, false), Some(Gear::Second));
    }

    #[test]
    fn stationary_output_not_classified() {
        let c = classifier();
        assert_eq!(c.classify(800, 0, false), None);
        assert_eq!(c.classify(800, 50, false), None);
        assert!(!c.is_stationary(51));
    }

    #[test]
    fn gap_between_windows_is_none() {
        let c = classifier();
        // 2.8 lies between second (max ~2.40) and first (min ~3.23).
        assert_eq!(c.classify(2800, 1000, false), None);
        // 1.7 lies between third and second.
        assert_eq!(c.classify(1700, 1000, false), None);
    }

    #[test]
    fn reverse_windows_only_with_hint() {
        let c = classifier();
        assert_eq!(c.classify(3160, 1000, true), Some(Gear::Reverse1));
        assert_eq!(c.classify(1926, 1000, true), Some(Gear::Reverse2));
        assert_eq!(c.classify(3160, 1000, false), None);
    }

    #[test]
    fn small_variant_ratios() {
        let config = GearboxConfig {
            variant: TransmissionVariant::Small,
            ..GearboxConfig::default()
        };
        let c = GearClassifier::from_config(&config).unwrap();
        assert_eq!(c.classify(3932, 1000, false), Some(Gear::First));
        assert_eq!(c.classify(1486, 1000, false), Some(Gear::Third));
    }

    proptest! {
        #[test]
        fn window_interior_classifies_to_its_gear(idx in 0usize..5, frac in 0.05f64..0.95) {
            let c = classifier();
            let w = c.table().forward()[idx];
            let ratio = w.min + (w.max - w.min) * frac;
            let output = 1000u32;
            let input = (ratio * output as f64).round() as u32;
            let measured = input as f64 / output as f64;
            prop_assume!(w.contains(measured));
            prop_assert_eq!(c.classify(input, output, false), Some(w.gear));
        }
    }
}
