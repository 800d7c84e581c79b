use crate::time::{Duration, Instant};

/// Timing parameters of a DHCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct RetryConfig {
    /// Minimum retransmission interval for states that insist on one
    /// (discovery and boot server discovery).
    pub min_timeout: Duration,
    /// Minimum retransmission interval for every other state.
    pub default_min_timeout: Duration,
    /// Retransmission interval at which the session gives up.
    pub max_timeout: Duration,
    /// How long discovery waits for a ProxyDHCP offer once it holds an
    /// ordinary one, and how long a ProxyDHCP request is retried.
    pub proxy_wait: Duration,
    /// How long each boot server discovery attempt lasts.
    pub pxebs_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            min_timeout: Duration::from_secs(1),
            default_min_timeout: Duration::from_millis(250),
            max_timeout: Duration::from_secs(10),
            proxy_wait: Duration::from_secs(2),
            pxebs_wait: Duration::from_secs(3),
        }
    }
}

/// What an expired timer asks of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Expiry {
    /// Retransmit, or advance the state.
    Retry,
    /// The interval grew past the maximum.
    Fail,
}

/// A retransmission timer with binary exponential backoff.
///
/// The interval doubles on every expiry. Starting the timer clamps the
/// interval up to the minimum, so a timer started with no delay fires once
/// immediately and then settles into `min, 2*min, 4*min, ...` until the
/// interval passes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryTimer {
    running: bool,
    timeout: Duration,
    min_timeout: Duration,
    max_timeout: Duration,
    expires_at: Instant,
}

impl RetryTimer {
    pub const fn new(min_timeout: Duration, max_timeout: Duration) -> RetryTimer {
        RetryTimer {
            running: false,
            timeout: Duration::ZERO,
            min_timeout,
            max_timeout,
            expires_at: Instant::ZERO,
        }
    }

    /// Change the interval bounds. Takes effect at the next start.
    pub fn set_bounds(&mut self, min_timeout: Duration, max_timeout: Duration) {
        self.min_timeout = min_timeout;
        self.max_timeout = max_timeout;
    }

    /// Arm the timer with the current interval.
    pub fn start(&mut self, now: Instant) {
        if self.timeout < self.min_timeout {
            self.timeout = self.min_timeout;
        }
        self.expires_at = now + self.timeout;
        self.running = true;
    }

    /// Arm the timer to expire at `now`, resetting the backoff.
    pub fn start_nodelay(&mut self, now: Instant) {
        self.timeout = Duration::ZERO;
        self.expires_at = now;
        self.running = true;
    }

    /// Disarm the timer and reset the backoff.
    pub fn stop(&mut self) {
        self.running = false;
        self.timeout = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Return the interval the next start will use, before clamping.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return when the timer expires, if it is armed.
    pub fn expires_at(&self) -> Option<Instant> {
        match self.running {
            true => Some(self.expires_at),
            false => None,
        }
    }

    /// If the timer has expired at `now`, disarm it and back off.
    pub fn poll(&mut self, now: Instant) -> Option<Expiry> {
        if !self.running || now < self.expires_at {
            return None;
        }
        self.running = false;
        self.timeout = self.timeout << 1;
        if self.timeout > self.max_timeout {
            self.timeout = self.max_timeout;
            Some(Expiry::Fail)
        } else {
            Some(Expiry::Retry)
        }
    }
}
