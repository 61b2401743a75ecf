//! Token budget split and tier-aware prefix selection
//!
//! The budget is split into a HIGH share (`floor(budget * fraction)`) and a
//! NORMAL share (the remainder). Each tier is filled greedily in chronological
//! order and stops at the first message that does not fit, so the selected
//! messages of a tier always form a prefix of that tier.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::models::{ClassifiedTranscript, Message, PriorityTier};

/// Default share of the budget reserved for HIGH tier messages
pub const DEFAULT_HIGH_TIER_FRACTION: f64 = 0.7;

/// Fixed-point scale for the tier split, avoids float rounding at integer boundaries
const FRACTION_SCALE: u128 = 1_000_000;

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Budget must be non-negative, got {0}")]
    Negative(i64),

    #[error("High tier fraction must lie strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),
}

/// A validated, non-negative token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget(usize);

impl TokenBudget {
    pub fn new(tokens: i64) -> Result<Self, BudgetError> {
        usize::try_from(tokens)
            .map(Self)
            .map_err(|_| BudgetError::Negative(tokens))
    }

    pub fn tokens(&self) -> usize {
        self.0
    }

    /// Split into HIGH and NORMAL sub-budgets
    pub fn split(&self, high_tier_fraction: f64) -> BudgetAllocation {
        let scaled = (high_tier_fraction * FRACTION_SCALE as f64).round() as u128;
        let high = (self.0 as u128 * scaled / FRACTION_SCALE) as usize;
        BudgetAllocation {
            total: self.0,
            high,
            normal: self.0 - high,
        }
    }
}

/// Budget allocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub total: usize,
    pub high: usize,
    pub normal: usize,
}

impl BudgetAllocation {
    pub fn for_tier(&self, tier: PriorityTier) -> usize {
        match tier {
            PriorityTier::High => self.high,
            PriorityTier::Normal => self.normal,
        }
    }
}

/// What happens to sub-budget left unused after both tier passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Sub-budgets are independent; leftovers are not reused
    #[default]
    None,
    /// Leftover budget extends the HIGH prefix, then the NORMAL prefix.
    /// Per-tier sub-budgets may then be exceeded; the total never is.
    Spill,
}

/// Outcome of one selection run. Refers to the transcript by index only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub selected_high: Vec<usize>,
    pub selected_normal: Vec<usize>,
    pub high_selected_tokens: usize,
    pub normal_selected_tokens: usize,
    pub total_selected_tokens: usize,
    pub total_available_tokens: usize,
    pub total_messages: usize,
    pub allocation: BudgetAllocation,
    pub overflow: OverflowPolicy,
    /// The whole transcript fit in the budget without any tier cut
    pub fits_entirely: bool,
}

impl Selection {
    /// `1 - selected/available`, or 0 when nothing is available
    pub fn compression_ratio(&self) -> f64 {
        if self.total_available_tokens == 0 {
            0.0
        } else {
            1.0 - self.total_selected_tokens as f64 / self.total_available_tokens as f64
        }
    }

    /// Compression ratio clamped to [0, 1] for display
    pub fn display_compression_ratio(&self) -> f64 {
        self.compression_ratio().clamp(0.0, 1.0)
    }

    pub fn selected_count(&self) -> usize {
        self.selected_high.len() + self.selected_normal.len()
    }

    pub fn omitted_count(&self) -> usize {
        self.total_messages - self.selected_count()
    }

    /// Selected indices of both tiers, ascending
    pub fn selected_indices(&self) -> Vec<usize> {
        let mut merged: Vec<usize> = self
            .selected_high
            .iter()
            .chain(&self.selected_normal)
            .copied()
            .collect();
        merged.sort_unstable();
        merged
    }

    /// The rejected remainder, ascending
    pub fn omitted_indices(&self) -> Vec<usize> {
        let mut selected = vec![false; self.total_messages];
        for &index in self.selected_high.iter().chain(&self.selected_normal) {
            selected[index] = true;
        }
        selected
            .iter()
            .enumerate()
            .filter(|(_, &s)| !s)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn no_compression_needed(&self) -> bool {
        self.omitted_count() == 0
    }
}

/// Partial result of a greedy pass over one tier
struct TierPass {
    indices: Vec<usize>,
    tokens: usize,
    /// Position (within the tier) of the first message that did not fit
    stopped_at: usize,
}

fn prefix_pass(tier: &[&Message], start: usize, limit: usize) -> TierPass {
    let mut pass = TierPass {
        indices: Vec::new(),
        tokens: 0,
        stopped_at: tier.len(),
    };
    for (position, message) in tier.iter().enumerate().skip(start) {
        if pass.tokens + message.token_count > limit {
            pass.stopped_at = position;
            break;
        }
        pass.tokens += message.token_count;
        pass.indices.push(message.index);
    }
    pass
}

/// Token budget allocator
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    high_tier_fraction: f64,
    overflow: OverflowPolicy,
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self {
            high_tier_fraction: DEFAULT_HIGH_TIER_FRACTION,
            overflow: OverflowPolicy::None,
        }
    }
}

impl BudgetAllocator {
    /// Create a new allocator
    pub fn new(high_tier_fraction: f64, overflow: OverflowPolicy) -> Result<Self, BudgetError> {
        if !(high_tier_fraction > 0.0 && high_tier_fraction < 1.0) {
            return Err(BudgetError::InvalidFraction(high_tier_fraction));
        }
        Ok(Self {
            high_tier_fraction,
            overflow,
        })
    }

    pub fn high_tier_fraction(&self) -> f64 {
        self.high_tier_fraction
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Select the message subset that fits the budget
    pub fn select(&self, classified: &ClassifiedTranscript, budget: TokenBudget) -> Selection {
        let allocation = budget.split(self.high_tier_fraction);
        let total_available_tokens = classified.transcript().total_tokens();
        let total_messages = classified.len();

        let mut selection = Selection {
            selected_high: Vec::new(),
            selected_normal: Vec::new(),
            high_selected_tokens: 0,
            normal_selected_tokens: 0,
            total_selected_tokens: 0,
            total_available_tokens,
            total_messages,
            allocation,
            overflow: self.overflow,
            fits_entirely: false,
        };

        if budget.tokens() == 0 {
            debug!("Zero budget, selecting nothing from {} messages", total_messages);
            return selection;
        }

        let high: Vec<&Message> = classified.tier_messages(PriorityTier::High).collect();
        let normal: Vec<&Message> = classified.tier_messages(PriorityTier::Normal).collect();

        if total_available_tokens <= budget.tokens() {
            debug!(
                "Transcript fits entirely: {} <= {} tokens",
                total_available_tokens,
                budget.tokens()
            );
            selection.selected_high = high.iter().map(|m| m.index).collect();
            selection.selected_normal = normal.iter().map(|m| m.index).collect();
            selection.high_selected_tokens = high.iter().map(|m| m.token_count).sum();
            selection.normal_selected_tokens = normal.iter().map(|m| m.token_count).sum();
            selection.total_selected_tokens = total_available_tokens;
            selection.fits_entirely = true;
            return selection;
        }

        let mut high_pass = prefix_pass(&high, 0, allocation.for_tier(PriorityTier::High));
        let mut normal_pass = prefix_pass(&normal, 0, allocation.for_tier(PriorityTier::Normal));

        debug!(
            "Strict passes: high {}/{} msgs {} tokens (budget {}), normal {}/{} msgs {} tokens (budget {})",
            high_pass.indices.len(),
            high.len(),
            high_pass.tokens,
            allocation.high,
            normal_pass.indices.len(),
            normal.len(),
            normal_pass.tokens,
            allocation.normal
        );

        if self.overflow == OverflowPolicy::Spill {
            let mut pool = budget.tokens() - high_pass.tokens - normal_pass.tokens;
            let extra_high = prefix_pass(&high, high_pass.stopped_at, pool);
            pool -= extra_high.tokens;
            let extra_normal = prefix_pass(&normal, normal_pass.stopped_at, pool);

            debug!(
                "Spilled leftover budget: +{} high msgs, +{} normal msgs",
                extra_high.indices.len(),
                extra_normal.indices.len()
            );

            high_pass.indices.extend(extra_high.indices);
            high_pass.tokens += extra_high.tokens;
            normal_pass.indices.extend(extra_normal.indices);
            normal_pass.tokens += extra_normal.tokens;
        }

        selection.high_selected_tokens = high_pass.tokens;
        selection.normal_selected_tokens = normal_pass.tokens;
        selection.total_selected_tokens = high_pass.tokens + normal_pass.tokens;
        selection.selected_high = high_pass.indices;
        selection.selected_normal = normal_pass.indices;
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::classifier::PriorityClassifier;
    use crate::context::models::{Role, Transcript};
    use crate::context::token_estimator::TokenEstimator;

    /// Counts one token per character, so tests control sizes exactly
    struct CharEstimator;

    impl TokenEstimator for CharEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.chars().count()
        }

        fn name(&self) -> &'static str {
            "chars"
        }
    }

    /// Messages 0..n where the ones in `high` carry a code fence; window 0
    fn classified(sizes: &[usize], high: &[usize]) -> ClassifiedTranscript {
        let turns = sizes.iter().enumerate().map(|(i, &size)| {
            let text = if high.contains(&i) {
                let mut t = "```".to_string();
                t.push_str(&"x".repeat(size.saturating_sub(3)));
                t
            } else {
                "y".repeat(size)
            };
            (Role::User, None, text)
        });
        let transcript = Transcript::from_turns("t", turns, &CharEstimator);
        PriorityClassifier::new(0).classify(&transcript)
    }

    #[test]
    fn test_negative_budget_rejected() {
        assert!(matches!(TokenBudget::new(-1), Err(BudgetError::Negative(-1))));
        assert_eq!(TokenBudget::new(0).unwrap().tokens(), 0);
    }

    #[test]
    fn test_split_uses_remainder_for_normal() {
        let allocation = TokenBudget::new(1000).unwrap().split(0.7);
        assert_eq!((allocation.high, allocation.normal), (700, 300));

        let allocation = TokenBudget::new(11).unwrap().split(0.7);
        assert_eq!((allocation.high, allocation.normal), (7, 4));

        let allocation = TokenBudget::new(10).unwrap().split(0.7);
        assert_eq!((allocation.high, allocation.normal), (7, 3));
        assert_eq!(allocation.for_tier(PriorityTier::High), 7);
        assert_eq!(allocation.for_tier(PriorityTier::Normal), 3);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(BudgetAllocator::new(0.0, OverflowPolicy::None).is_err());
        assert!(BudgetAllocator::new(1.0, OverflowPolicy::None).is_err());
        assert!(BudgetAllocator::new(f64::NAN, OverflowPolicy::None).is_err());
        assert!(BudgetAllocator::new(0.5, OverflowPolicy::None).is_ok());
    }

    #[test]
    fn test_zero_budget_selects_nothing() {
        let c = classified(&[10, 20, 30], &[0]);
        let selection = BudgetAllocator::default().select(&c, TokenBudget::new(0).unwrap());
        assert_eq!(selection.selected_count(), 0);
        assert_eq!(selection.total_selected_tokens, 0);
        assert_eq!(selection.compression_ratio(), 1.0);
        assert_eq!(selection.omitted_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_large_budget_selects_everything() {
        let c = classified(&[10, 20, 30], &[0, 1, 2]);
        let selection = BudgetAllocator::default().select(&c, TokenBudget::new(60).unwrap());
        assert!(selection.fits_entirely);
        assert!(selection.no_compression_needed());
        assert_eq!(selection.selected_indices(), vec![0, 1, 2]);
        assert_eq!(selection.compression_ratio(), 0.0);
    }

    #[test]
    fn test_prefix_selection_stops_at_first_overflow() {
        // high tier: 0 (30), 2 (50), 3 (10); normal: 1 (20), 4 (5)
        let c = classified(&[30, 20, 50, 10, 5], &[0, 2, 3]);
        let selection = BudgetAllocator::default().select(&c, TokenBudget::new(100).unwrap());

        // high budget 70: 30 fits, 50 would reach 80, so 3 is skipped even though it fits
        assert_eq!(selection.selected_high, vec![0]);
        // normal budget 30: 20 + 5
        assert_eq!(selection.selected_normal, vec![1, 4]);
        assert_eq!(selection.high_selected_tokens, 30);
        assert_eq!(selection.normal_selected_tokens, 25);
        assert_eq!(selection.selected_indices(), vec![0, 1, 4]);
        assert_eq!(selection.omitted_indices(), vec![2, 3]);
        assert!(!selection.fits_entirely);
    }

    #[test]
    fn test_unused_budget_does_not_roll_over_by_default() {
        // only normal messages; high share stays unused
        let c = classified(&[20, 20, 20], &[]);
        let selection = BudgetAllocator::default().select(&c, TokenBudget::new(50).unwrap());
        assert_eq!(selection.allocation.normal, 15);
        assert!(selection.selected_normal.is_empty());
    }

    #[test]
    fn test_spill_policy_reuses_leftover_budget() {
        let c = classified(&[20, 20, 20], &[]);
        let allocator = BudgetAllocator::new(0.7, OverflowPolicy::Spill).unwrap();
        let selection = allocator.select(&c, TokenBudget::new(50).unwrap());
        assert_eq!(selection.selected_normal, vec![0, 1]);
        assert!(selection.total_selected_tokens <= 50);
    }

    #[test]
    fn test_selection_respects_sub_budgets() {
        let sizes: Vec<usize> = (0..40).map(|i| 3 + (i * 7) % 23).collect();
        let high: Vec<usize> = (0..40).filter(|i| i % 3 != 0).collect();
        let c = classified(&sizes, &high);
        let allocator = BudgetAllocator::default();

        for budget in [1, 5, 17, 50, 99, 150, 300, 1000] {
            let selection = allocator.select(&c, TokenBudget::new(budget).unwrap());
            assert!(selection.total_selected_tokens <= budget as usize);
            if !selection.fits_entirely {
                assert!(selection.high_selected_tokens <= selection.allocation.high);
                assert!(selection.normal_selected_tokens <= selection.allocation.normal);
            }

            for (tier, selected) in [
                (PriorityTier::High, &selection.selected_high),
                (PriorityTier::Normal, &selection.selected_normal),
            ] {
                let tier_indices: Vec<usize> = c.tier_messages(tier).map(|m| m.index).collect();
                assert_eq!(&tier_indices[..selected.len()], selected.as_slice());
            }
        }
    }
}
