use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct RsmOptions {
    /// How long one apply iteration waits for the next slot to be decided
    /// before switching to catch-up. The expiry is the catch-up trigger, not
    /// an error.
    pub instance_fetch_timeout: Option<Duration>,

    /// How many successful applies pass between trim hints. Once the count
    /// exceeds this value the coordinator is told to forget slots below
    /// `done` and the count restarts, i.e. the default of 100 trims on every
    /// 101st apply. The count lives in memory only and restarts with the
    /// driver.
    pub forget_interval: Option<u32>,
}

pub(crate) struct RsmOptionsValidated {
    pub instance_fetch_timeout: Duration,
    pub forget_interval: u32,
}

impl RsmOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.instance_fetch_timeout.is_zero() {
            return Err("Instance fetch timeout must be non-zero");
        }
        if self.forget_interval == 0 {
            return Err("Forget interval must be at least 1");
        }

        Ok(())
    }
}

impl TryFrom<RsmOptions> for RsmOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RsmOptions) -> Result<Self, Self::Error> {
        let values = RsmOptionsValidated {
            instance_fetch_timeout: options.instance_fetch_timeout.unwrap_or(Duration::from_millis(100)),
            forget_interval: options.forget_interval.unwrap_or(100),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let validated = RsmOptionsValidated::try_from(RsmOptions::default()).unwrap();

        assert_eq!(validated.instance_fetch_timeout, Duration::from_millis(100));
        assert_eq!(validated.forget_interval, 100);
    }

    #[test]
    fn zero_timeout_rejected() {
        let options = RsmOptions {
            instance_fetch_timeout: Some(Duration::ZERO),
            ..Default::default()
        };

        assert!(RsmOptionsValidated::try_from(options).is_err());
    }

    #[test]
    fn zero_forget_interval_rejected() {
        let options = RsmOptions {
            forget_interval: Some(0),
            ..Default::default()
        };

        assert!(RsmOptionsValidated::try_from(options).is_err());
    }
}
