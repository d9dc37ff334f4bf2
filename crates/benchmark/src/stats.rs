use std::collections::BTreeMap;

use crate::{
    fee::GasPriceTier,
    plan::{ExecuteResult, SettledResult},
};

#[derive(Clone, Debug, PartialEq)]
pub struct TierStats {
    pub gas_price: Option<u128>,
    pub max: u128,
    pub min: u128,
    pub avg: f32,
    pub success: usize,
    pub failure: usize,
}

impl Default for TierStats {
    fn default() -> Self {
        Self {
            gas_price: None,
            max: 0,
            min: u128::MAX,
            avg: 0f32,
            success: 0,
            failure: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub tiers: BTreeMap<GasPriceTier, TierStats>,
    pub fulfilled: usize,
    pub rejected: usize,
}

#[derive(Default)]
struct TierStatsHandler {
    stats: TierStats,
    sum: u128,
}

impl TierStatsHandler {
    fn insert(&mut self, settled: &SettledResult) {
        match settled {
            SettledResult::Fulfilled(res) => {
                let dur_ms = res.execute_time_millis;
                if dur_ms > self.stats.max {
                    self.stats.max = dur_ms;
                }
                if dur_ms < self.stats.min {
                    self.stats.min = dur_ms;
                }
                self.sum += dur_ms;
                self.stats.gas_price = Some(res.gas_price);
                self.stats.success += 1;
            }
            SettledResult::Rejected(failure) => {
                self.stats.gas_price.get_or_insert(failure.gas_price);
                self.stats.failure += 1;
            }
        }
    }

    fn stats(mut self) -> TierStats {
        if self.stats.success == 0 {
            self.stats.min = 0;
        } else {
            self.stats.avg = self.sum as f32 / self.stats.success as f32;
        }
        self.stats
    }
}

pub fn tier_stats(results: &[SettledResult]) -> Stats {
    let mut handlers: BTreeMap<GasPriceTier, TierStatsHandler> = BTreeMap::new();
    for settled in results {
        handlers
            .entry(settled.gas_price_tier())
            .or_default()
            .insert(settled);
    }
    let fulfilled = results.iter().filter(|r| r.is_fulfilled()).count();
    Stats {
        tiers: handlers
            .into_iter()
            .map(|(tier, handler)| (tier, handler.stats()))
            .collect(),
        fulfilled,
        rejected: results.len() - fulfilled,
    }
}

/// Fulfilled results, fastest first.
pub fn sorted_by_latency(results: &[SettledResult]) -> Vec<&ExecuteResult> {
    let mut fulfilled: Vec<&ExecuteResult> = results
        .iter()
        .filter_map(|settled| match settled {
            SettledResult::Fulfilled(res) => Some(res),
            SettledResult::Rejected(_) => None,
        })
        .collect();
    fulfilled.sort_by_key(|res| res.execute_time_millis);
    fulfilled
}

pub fn output_report(results: &[SettledResult]) {
    for res in sorted_by_latency(results) {
        log::info!(
            "account {} nonce {}: {} tier, gas price {}, execute time {}ms",
            res.account_id,
            res.nonce,
            res.gas_price_tier,
            res.gas_price,
            res.execute_time_millis
        );
    }
    let stats = tier_stats(results);
    for (tier, s) in &stats.tiers {
        log::info!("{} tier: {:?}", tier, s);
    }
    log::info!(
        "total: {}, fulfilled: {}, rejected: {}",
        results.len(),
        stats.fulfilled,
        stats.rejected
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ckb_fixed_hash::H256;

    use super::*;
    use crate::{error::ExecuteError, godwoken_rpc::TxReceipt, plan::ExecuteFailure};

    fn fulfilled(tier: GasPriceTier, gas_price: u128, millis: u128) -> SettledResult {
        SettledResult::Fulfilled(ExecuteResult {
            receipt: TxReceipt {
                transaction_hash: H256::default(),
                block_hash: None,
                block_number: None,
                gas_used: None,
                status: None,
            },
            gas_price,
            gas_price_tier: tier,
            execute_time_millis: millis,
            account_id: millis as u32,
            nonce: 0,
        })
    }

    fn timed_out(tier: GasPriceTier, gas_price: u128) -> SettledResult {
        SettledResult::Rejected(ExecuteFailure {
            gas_price,
            gas_price_tier: tier,
            account_id: 0,
            nonce: 0,
            reason: ExecuteError::Timeout {
                tx_hash: H256::default(),
                timeout: Duration::from_millis(250),
            },
        })
    }

    #[test]
    fn test_tier_stats() {
        let results = vec![
            fulfilled(GasPriceTier::Low, 100, 300),
            fulfilled(GasPriceTier::Even, 110, 200),
            fulfilled(GasPriceTier::High, 120, 100),
            fulfilled(GasPriceTier::Low, 100, 500),
            timed_out(GasPriceTier::Even, 110),
            timed_out(GasPriceTier::High, 120),
        ];
        let stats = tier_stats(&results);
        assert_eq!(stats.fulfilled, 4);
        assert_eq!(stats.rejected, 2);

        let low = &stats.tiers[&GasPriceTier::Low];
        assert_eq!((low.min, low.max), (300, 500));
        assert!((low.avg - 400f32).abs() < f32::EPSILON);
        assert_eq!((low.success, low.failure), (2, 0));
        assert_eq!(low.gas_price, Some(100));

        let even = &stats.tiers[&GasPriceTier::Even];
        assert_eq!((even.success, even.failure), (1, 1));
        assert_eq!(even.gas_price, Some(110));
    }

    #[test]
    fn test_all_rejected_tier() {
        let stats = tier_stats(&[timed_out(GasPriceTier::High, 120)]);
        let high = &stats.tiers[&GasPriceTier::High];
        assert_eq!((high.min, high.max, high.success, high.failure), (0, 0, 0, 1));
        assert_eq!(high.gas_price, Some(120));
        assert!(!stats.tiers.contains_key(&GasPriceTier::Low));
    }

    #[test]
    fn test_sorted_by_latency() {
        let results = vec![
            fulfilled(GasPriceTier::Low, 100, 300),
            timed_out(GasPriceTier::Even, 110),
            fulfilled(GasPriceTier::High, 120, 100),
            fulfilled(GasPriceTier::Even, 110, 200),
        ];
        let millis: Vec<u128> = sorted_by_latency(&results)
            .iter()
            .map(|res| res.execute_time_millis)
            .collect();
        assert_eq!(millis, vec![100, 200, 300]);
    }
}
