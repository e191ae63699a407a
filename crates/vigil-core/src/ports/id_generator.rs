//! IdGenerator port - ID 生成の抽象化
//!
//! 実装:
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を作る

use crate::domain::ids::{CycleId, InstanceId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn instance_id(&self) -> InstanceId;

    fn cycle_id(&self) -> CycleId;
}

/// ULID generator driven by a `Clock`, so a `ManualClock` yields
/// predictable timestamp parts in tests.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn instance_id(&self) -> InstanceId {
        InstanceId::from_ulid(self.next())
    }

    fn cycle_id(&self) -> CycleId {
        CycleId::from_ulid(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let ids = UlidGenerator::new(SystemClock);
        assert_ne!(ids.instance_id(), ids.instance_id());
        assert_ne!(ids.cycle_id(), ids.cycle_id());
    }

    #[test]
    fn timestamp_part_follows_clock() {
        let fixed = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(ManualClock::new(fixed));

        let a = ids.instance_id();
        let b = ids.instance_id();
        assert_ne!(a, b);
        assert_eq!(a.as_ulid().timestamp_ms(), fixed.timestamp_millis() as u64);
        assert_eq!(b.as_ulid().timestamp_ms(), fixed.timestamp_millis() as u64);
    }
}
