use std::time::Duration;

/// An infinite stream of wait durations that doubles up to a maximum and
/// then stays there. Used to pace reconnect attempts on the TCP wire.
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration) -> ExponentialBackoff {
        ExponentialBackoff { curr: start, max }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let wait = self.curr;
        self.curr = (self.curr * 2).min(self.max);
        Some(wait)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn waits_double_and_saturate() {
        let waits: Vec<_> = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
        )
        .take(5)
        .collect();

        assert_eq!(
            waits,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }
}
