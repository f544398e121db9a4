//! Hardware controller claim set
//!
//! Tracks which hardware I2C controllers are still unclaimed in a build
//! session. A controller leaves the set exactly once and is never returned.

/// Unclaimed hardware controllers, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    unclaimed: Vec<String>,
    claimed: Vec<String>,
}

impl ClaimSet {
    /// Create a claim set holding every listed controller
    pub fn from_controllers<I, S>(controllers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unclaimed: controllers.into_iter().map(Into::into).collect(),
            claimed: Vec::new(),
        }
    }

    /// Check if a controller is still unclaimed
    pub fn contains(&self, controller: &str) -> bool {
        self.unclaimed.iter().any(|c| c == controller)
    }

    /// Controller that the next unspecific claim would receive
    pub fn peek_next(&self) -> Option<&str> {
        self.unclaimed.first().map(String::as_str)
    }

    /// Claim a controller, returning false if it is not in the set
    pub fn claim(&mut self, controller: &str) -> bool {
        match self.unclaimed.iter().position(|c| c == controller) {
            Some(idx) => {
                let id = self.unclaimed.remove(idx);
                self.claimed.push(id);
                true
            }
            None => false,
        }
    }

    /// Unclaimed controllers, in registration order
    pub fn unclaimed(&self) -> &[String] {
        &self.unclaimed
    }

    /// Claimed controllers, in claim order
    pub fn claimed(&self) -> &[String] {
        &self.claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_once() {
        let mut set = ClaimSet::from_controllers(["i2c0", "i2c1"]);
        assert_eq!(set.peek_next(), Some("i2c0"));
        assert!(set.claim("i2c1"));
        assert!(!set.claim("i2c1"));
        assert_eq!(set.unclaimed(), ["i2c0"]);
        assert_eq!(set.claimed(), ["i2c1"]);

        assert!(set.claim("i2c0"));
        assert!(set.unclaimed().is_empty());
        assert_eq!(set.peek_next(), None);
    }

    #[test]
    fn test_unknown_controller() {
        let mut set = ClaimSet::from_controllers(["i2c0"]);
        assert!(!set.contains("i2c7"));
        assert!(!set.claim("i2c7"));
        assert_eq!(set.unclaimed(), ["i2c0"]);
    }
}
