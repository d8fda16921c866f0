//! Rating → percentage conversion with diminishing returns.

/// Converts a raw rating into a percentage.
///
/// The linear region is level adjusted: at higher levels more rating is
/// needed per percent. Past `soft_cap` returns diminish, approaching
/// `hard_cap` asymptotically when one is set, or continuing at half rate
/// when it is not.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingCurve {
    /// Rating required for one percent at level 1.
    pub rating_per_percent: f64,
    /// Growth of `rating_per_percent` per level above 1.
    pub level_growth: f64,
    /// Percentage where diminishing returns begin.
    pub soft_cap: f64,
    /// Asymptotic ceiling, if any.
    pub hard_cap: Option<f64>,
}

impl RatingCurve {
    pub const fn new(
        rating_per_percent: f64,
        level_growth: f64,
        soft_cap: f64,
        hard_cap: Option<f64>,
    ) -> Self {
        Self {
            rating_per_percent,
            level_growth,
            soft_cap,
            hard_cap,
        }
    }

    /// Linear percentage before any cap is applied.
    pub fn linear(&self, rating: f64, level: f64) -> f64 {
        let level_factor = 1.0 + (level.max(1.0) - 1.0) * self.level_growth;
        let per_percent = self.rating_per_percent * level_factor;
        if per_percent <= 0.0 {
            return 0.0;
        }
        rating.max(0.0) / per_percent
    }

    /// Final percentage for `rating` at `level`.
    ///
    /// ```
    /// # use combat_core::stats::RatingCurve;
    /// let curve = RatingCurve::new(10.0, 0.0, 30.0, None);
    /// assert_eq!(curve.percent(200.0, 1.0), 20.0);
    /// // 50% linear: 30 + (50 - 30) × 0.5
    /// assert_eq!(curve.percent(500.0, 1.0), 40.0);
    /// ```
    pub fn percent(&self, rating: f64, level: f64) -> f64 {
        let linear = self.linear(rating, level);
        if linear <= self.soft_cap {
            return linear;
        }

        let excess = linear - self.soft_cap;
        match self.hard_cap {
            Some(hard) if hard > self.soft_cap => {
                let span = hard - self.soft_cap;
                self.soft_cap + span * (1.0 - (-excess / span).exp())
            }
            Some(hard) => hard.min(linear),
            None => self.soft_cap + excess * 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn linear_below_soft_cap() {
        let curve = RatingCurve::new(14.0, 0.1, 50.0, Some(75.0));
        assert!((curve.percent(140.0, 1.0) - 10.0).abs() < EPS);
    }

    #[test]
    fn level_raises_rating_cost() {
        let curve = RatingCurve::new(10.0, 0.1, 50.0, None);
        // Level 11: 10 × (1 + 10 × 0.1) = 20 rating per percent
        assert!((curve.percent(200.0, 11.0) - 10.0).abs() < EPS);
    }

    #[test]
    fn hard_cap_is_approached_but_not_reached() {
        let curve = RatingCurve::new(1.0, 0.0, 50.0, Some(75.0));
        let at = curve.percent(60.0, 1.0);
        // 50 + 25 × (1 - e^(-10/25))
        let expected = 50.0 + 25.0 * (1.0 - (-10.0_f64 / 25.0).exp());
        assert!((at - expected).abs() < EPS);

        let huge = curve.percent(1.0e6, 1.0);
        assert!(huge < 75.0 + EPS);
        assert!(huge > 74.9);
    }

    #[test]
    fn without_hard_cap_excess_is_halved() {
        let curve = RatingCurve::new(1.0, 0.0, 30.0, None);
        assert!((curve.percent(50.0, 1.0) - 40.0).abs() < EPS);
    }

    #[test]
    fn negative_rating_is_zero() {
        let curve = RatingCurve::new(10.0, 0.0, 30.0, None);
        assert_eq!(curve.percent(-50.0, 1.0), 0.0);
    }

    #[test]
    fn curve_is_monotonic() {
        let curve = RatingCurve::new(5.0, 0.1, 40.0, Some(60.0));
        let mut last = 0.0;
        for rating in (0..2_000).step_by(25) {
            let p = curve.percent(f64::from(rating), 5.0);
            assert!(p + EPS >= last);
            last = p;
        }
    }
}
