use std::time::Duration;

use crate::common::{
    Timing,
    error::{Result, SchedulerError},
};

/// Tick 时序的校验与换算
///
/// 核心把 Tick 当作不透明的单调单位，这里只负责把调用方传入的原始参数
/// (与宿主接口保持一致，使用有符号整数) 校验成合法的 `Timing`。
pub struct TickUtils;

impl TickUtils {
    /// 校验延迟参数
    pub fn delayed(delay: i64) -> Result<Timing> {
        Ok(Timing::Delayed(Self::check_delay(delay)?))
    }

    /// 校验周期参数
    pub fn periodic(delay: i64, period: i64) -> Result<Timing> {
        let delay = Self::check_delay(delay)?;
        if period <= 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "period must be positive, got {}",
                period
            )));
        }
        Ok(Timing::Periodic {
            delay,
            period: period as u64,
        })
    }

    fn check_delay(delay: i64) -> Result<u64> {
        u64::try_from(delay).map_err(|_| {
            SchedulerError::InvalidArgument(format!("delay must not be negative, got {}", delay))
        })
    }

    /// Tick -> 墙钟时间
    ///
    /// 只给按墙钟计时的宿主接口使用。
    pub fn to_duration(ticks: u64, tick_millis: u64) -> Duration {
        Duration::from_millis(ticks.saturating_mul(tick_millis))
    }

    /// 墙钟时间 -> Tick (向上取整)
    pub fn from_duration(duration: Duration, tick_millis: u64) -> u64 {
        let millis = duration.as_millis() as u64;
        let tick = tick_millis.max(1);
        millis.div_ceil(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_delay_is_invalid() {
        assert!(matches!(
            TickUtils::delayed(-1),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            TickUtils::periodic(-5, 20),
            Err(SchedulerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn non_positive_period_is_invalid() {
        assert!(TickUtils::periodic(0, 0).is_err());
        assert!(TickUtils::periodic(10, -20).is_err());
        assert_eq!(
            TickUtils::periodic(0, 1).unwrap(),
            Timing::Periodic {
                delay: 0,
                period: 1
            }
        );
    }

    #[test]
    fn duration_conversion_rounds_up() {
        assert_eq!(TickUtils::to_duration(20, 50), Duration::from_secs(1));
        assert_eq!(TickUtils::from_duration(Duration::from_millis(51), 50), 2);
        assert_eq!(TickUtils::from_duration(Duration::ZERO, 50), 0);
    }
}
