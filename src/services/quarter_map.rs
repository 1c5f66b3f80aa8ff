use std::collections::BTreeSet;

/// Fiscal quarter (1-4) to calendar month lookup.
///
/// Every quarter spans three consecutive months starting at the fiscal year's
/// first month, wrapping past December. An anchor of 3 yields
/// `{1: [3,4,5], 2: [6,7,8], 3: [9,10,11], 4: [12,1,2]}`; an anchor of 1 yields
/// plain calendar quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarterMap {
    start_month: u32,
}

pub const DEFAULT_FISCAL_START_MONTH: u32 = 3;

impl Default for QuarterMap {
    fn default() -> Self {
        Self::new(DEFAULT_FISCAL_START_MONTH)
    }
}

impl QuarterMap {
    /// Out-of-range anchors fall back to the March fiscal year.
    pub fn new(start_month: u32) -> Self {
        let start_month = if (1..=12).contains(&start_month) {
            start_month
        } else {
            DEFAULT_FISCAL_START_MONTH
        };
        Self { start_month }
    }

    pub fn start_month(&self) -> u32 {
        self.start_month
    }

    pub fn months_for(&self, quarter: u32) -> Option<[u32; 3]> {
        if !(1..=4).contains(&quarter) {
            return None;
        }
        let offset = (quarter - 1) * 3;
        let month_at = |step: u32| (self.start_month - 1 + offset + step) % 12 + 1;
        Some([month_at(0), month_at(1), month_at(2)])
    }

    /// Union of the months covered by `quarters`, sorted and de-duplicated.
    /// Quarters outside 1-4 contribute nothing.
    pub fn expand<'a, I>(&self, quarters: I) -> Vec<u32>
    where
        I: IntoIterator<Item = &'a u32>,
    {
        quarters
            .into_iter()
            .filter_map(|quarter| self.months_for(*quarter))
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::QuarterMap;

    #[test]
    fn default_map_is_march_fiscal_year() {
        let map = QuarterMap::default();
        assert_eq!(map.months_for(1), Some([3, 4, 5]));
        assert_eq!(map.months_for(2), Some([6, 7, 8]));
        assert_eq!(map.months_for(3), Some([9, 10, 11]));
        assert_eq!(map.months_for(4), Some([12, 1, 2]));
    }

    #[test]
    fn january_anchor_gives_calendar_quarters() {
        let map = QuarterMap::new(1);
        assert_eq!(map.months_for(1), Some([1, 2, 3]));
        assert_eq!(map.months_for(4), Some([10, 11, 12]));
    }

    #[test]
    fn rejects_quarters_outside_one_to_four() {
        let map = QuarterMap::default();
        assert_eq!(map.months_for(0), None);
        assert_eq!(map.months_for(5), None);
    }

    #[test]
    fn expansion_is_exact_union() {
        let map = QuarterMap::default();
        assert_eq!(map.expand(&[1]), vec![3, 4, 5]);
        assert_eq!(map.expand(&[4, 1, 4]), vec![1, 2, 3, 4, 5, 12]);
        assert_eq!(
            map.expand(&[1, 2, 3, 4]),
            (1..=12).collect::<Vec<u32>>()
        );
        assert!(map.expand(&[] as &[u32]).is_empty());
    }

    #[test]
    fn invalid_anchor_uses_default() {
        assert_eq!(QuarterMap::new(0), QuarterMap::default());
        assert_eq!(QuarterMap::new(13).start_month(), 3);
    }
}
