use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocator::AllocationResult;
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipItem {
    pub id: u64,
    pub fixture_id: u64,
    pub bookmaker_id: u32,
    pub bet_id: u32,
    pub key: String,
    pub odd: f64,
    pub stake: f64,
    #[serde(default)]
    pub fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSlip {
    pub amount: f64,
    pub items: Vec<SlipItem>,
}

impl BetSlip {
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            items: Vec::new(),
        }
    }

    pub fn from_allocation(alloc: &AllocationResult) -> Self {
        let items = alloc
            .bets
            .iter()
            .enumerate()
            .map(|(i, b)| SlipItem {
                id: i as u64 + 1,
                fixture_id: b.bet.fixture_id,
                bookmaker_id: b.bet.bookmaker_id,
                bet_id: b.bet.bet_id,
                key: b.bet.key.clone(),
                odd: b.bet.odd,
                stake: b.stake,
                fixed: false,
            })
            .collect();
        Self {
            amount: alloc.bankroll,
            items,
        }
    }

    pub fn push(&mut self, item: SlipItem) -> Result<(), ModelError> {
        let fixed = item.fixed;
        let id = item.id;
        self.items.push(item);
        if fixed && let Err(err) = self.rebalance(id) {
            self.items.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn fix_stake(&mut self, id: u64, stake: f64) -> Result<(), ModelError> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or(ModelError::UnknownSlipItem(id))?;
        let previous = (self.items[pos].stake, self.items[pos].fixed);
        self.items[pos].stake = stake;
        self.items[pos].fixed = true;
        if let Err(err) = self.rebalance(id) {
            (self.items[pos].stake, self.items[pos].fixed) = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.stake).sum()
    }

    fn rebalance(&mut self, pinned: u64) -> Result<(), ModelError> {
        let fixed: f64 = self.items.iter().filter(|i| i.fixed).map(|i| i.stake).sum();
        let free: f64 = self
            .items
            .iter()
            .filter(|i| !i.fixed)
            .map(|i| i.stake)
            .sum();
        if free <= 0.0 {
            return Ok(());
        }

        let rate = (self.amount - fixed) / free;
        if rate < 0.0 {
            return Err(ModelError::SlipOverCommitted {
                fixed,
                amount: self.amount,
            });
        }
        for item in self.items.iter_mut().filter(|i| !i.fixed) {
            item.stake *= rate;
        }
        debug!(pinned, rate, "bet slip rebalanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, stake: f64, fixed: bool) -> SlipItem {
        SlipItem {
            id,
            fixture_id: 1,
            bookmaker_id: 8,
            bet_id: 1,
            key: "Home".to_string(),
            odd: 1.9,
            stake,
            fixed,
        }
    }

    fn seeded() -> BetSlip {
        let mut slip = BetSlip::new(100.0);
        slip.push(item(1, 30.0, true)).unwrap();
        slip.push(item(2, 30.0, false)).unwrap();
        slip.push(item(3, 40.0, false)).unwrap();
        slip
    }

    #[test]
    fn first_pinned_item_with_nothing_to_rebalance_is_kept() {
        let slip = seeded();
        assert!((slip.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn adding_a_pinned_item_rescales_the_free_ones() {
        let mut slip = seeded();
        slip.push(item(4, 50.0, true)).unwrap();
        let stake = |id: u64| slip.items.iter().find(|i| i.id == id).unwrap().stake;
        assert_eq!(stake(1), 30.0);
        assert_eq!(stake(4), 50.0);
        assert!((stake(2) - 8.5714).abs() < 1e-3);
        assert!((stake(3) - 11.4286).abs() < 1e-3);
        assert!((slip.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn over_committed_pin_is_rejected_and_rolled_back() {
        let mut slip = seeded();
        let err = slip.fix_stake(2, 90.0).unwrap_err();
        assert_eq!(
            err,
            ModelError::SlipOverCommitted {
                fixed: 120.0,
                amount: 100.0
            }
        );
        assert_eq!(slip, seeded());

        assert!(slip.push(item(4, 80.0, true)).is_err());
        assert_eq!(slip.items.len(), 3);
    }

    #[test]
    fn pinning_an_unknown_item_fails() {
        let mut slip = seeded();
        assert_eq!(slip.fix_stake(9, 1.0), Err(ModelError::UnknownSlipItem(9)));
    }

    #[test]
    fn pinning_an_existing_item_keeps_the_total() {
        let mut slip = seeded();
        slip.fix_stake(3, 20.0).unwrap();
        assert!((slip.total() - 100.0).abs() < 1e-9);
        let free = slip.items.iter().find(|i| i.id == 2).unwrap().stake;
        assert!((free - 50.0).abs() < 1e-9);
    }
}
