//! Data usage counters
//!
//! The module's `+UGCNTRD` counters restart from zero whenever the module
//! resets. The driver keeps a cached copy and an offset per counter so the
//! values it reports never go backwards.

use serde::Serialize;

use super::Modem;
use crate::at::fields;
use crate::engine::{Error, Flow};
use crate::transport::{Clock, PowerControl, Transport};

/// Byte counters as reported by the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataUsage {
    pub cid: u8,
    pub tx_session: u64,
    pub rx_session: u64,
    pub tx_total: u64,
    pub rx_total: u64,
}

/// One cached counter and the offset folded into it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub value: u64,
    pub offset: u64,
}

impl Counter {
    /// Apply a fresh module value.
    ///
    /// The result is `queried + offset`; when that would fall below the cached
    /// value the module counter restarted, so the offset is re-based to keep
    /// the reported value where it was.
    pub fn rebase(self, queried: u64) -> Counter {
        let value = queried.saturating_add(self.offset);
        if value < self.value {
            Counter {
                value: self.value,
                offset: self.value - queried,
            }
        } else {
            Counter {
                value,
                offset: self.offset,
            }
        }
    }
}

/// Cached counters of the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCache {
    pub cid: u8,
    pub tx_session: Counter,
    pub rx_session: Counter,
    pub tx_total: Counter,
    pub rx_total: Counter,
}

impl UsageCache {
    /// The cached values as seen by the application.
    pub fn usage(&self) -> DataUsage {
        DataUsage {
            cid: self.cid,
            tx_session: self.tx_session.value,
            rx_session: self.rx_session.value,
            tx_total: self.tx_total.value,
            rx_total: self.rx_total.value,
        }
    }
}

/// Reconcile the cache with a fresh query. `None` when the query failed.
pub fn rebase(cached: &UsageCache, queried: &DataUsage, ok: bool) -> Option<UsageCache> {
    if !ok {
        return None;
    }
    Some(UsageCache {
        cid: queried.cid,
        tx_session: cached.tx_session.rebase(queried.tx_session),
        rx_session: cached.rx_session.rebase(queried.rx_session),
        tx_total: cached.tx_total.rebase(queried.tx_total),
        rx_total: cached.rx_total.rebase(queried.rx_total),
    })
}

impl<T, C, P, const S: usize> Modem<'_, T, C, P, S>
where
    T: Transport,
    C: Clock,
    P: PowerControl,
{
    /// Query `+UGCNTRD` and return the rebased counters.
    pub fn data_usage(&mut self) -> Result<DataUsage, Error> {
        self.ensure_powered()?;
        log::info!("[ Modem::data_usage ]");

        let mut queried = None;
        let result = self.engine.query(
            format_args!("AT+UGCNTRD"),
            self.config.default_timeout_ms,
            &mut |r, _| {
                // +UGCNTRD: <cid>,<tx_sess>,<rx_sess>,<tx_total>,<rx_total>
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UGCNTRD")) {
                    let parsed = (|| {
                        Ok::<_, fields::FieldError>(DataUsage {
                            cid: fields::int(&f, 0)?,
                            tx_session: fields::int(&f, 1)?,
                            rx_session: fields::int(&f, 2)?,
                            tx_total: fields::int(&f, 3)?,
                            rx_total: fields::int(&f, 4)?,
                        })
                    })();
                    if let Ok(usage) = parsed {
                        queried = Some(usage);
                    }
                }
                Flow::Continue
            },
        );

        let ok = result.is_ok() && queried.is_some();
        let queried = queried.unwrap_or_default();
        match rebase(&self.usage, &queried, ok) {
            Some(cache) => {
                self.usage = cache;
                Ok(cache.usage())
            }
            None => Err(result.err().unwrap_or(Error::Protocol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_follows_module() {
        let cached = Counter {
            value: 100,
            offset: 10,
        };
        let next = cached.rebase(95);
        assert_eq!(next.value, 105);
        assert_eq!(next.offset, 10);
    }

    #[test]
    fn test_counter_survives_module_reset() {
        let cached = Counter {
            value: 100,
            offset: 10,
        };
        let reset = cached.rebase(0);
        assert_eq!(reset.value, 100);
        assert_eq!(reset.offset, 100);

        let later = reset.rebase(25);
        assert_eq!(later.value, 125);
        assert!(later.value >= reset.value);
    }

    #[test]
    fn test_failed_query_not_updated() {
        let cached = UsageCache::default();
        let queried = DataUsage {
            cid: 1,
            tx_session: 5,
            ..DataUsage::default()
        };
        assert_eq!(rebase(&cached, &queried, false), None);
    }

    #[test]
    fn test_rebase_all_counters() {
        let mut cached = UsageCache::default();
        let first = DataUsage {
            cid: 1,
            tx_session: 10,
            rx_session: 20,
            tx_total: 30,
            rx_total: 40,
        };
        cached = rebase(&cached, &first, true).unwrap();
        assert_eq!(cached.usage(), first);

        let after_reset = DataUsage {
            cid: 1,
            tx_session: 1,
            rx_session: 2,
            tx_total: 3,
            rx_total: 4,
        };
        let usage = rebase(&cached, &after_reset, true).unwrap().usage();
        assert_eq!(usage.tx_session, 10);
        assert_eq!(usage.rx_total, 40);
    }
}
