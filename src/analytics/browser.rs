//! Coarse browser-family classification of user-agent strings

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Unknown,
}

impl BrowserFamily {
    /// Classify by plain substring match, tested in a fixed order.
    ///
    /// Chrome user agents also contain "Safari" (and Edge ones contain
    /// "Chrome"), so the order decides the result and must stay as is.
    pub fn classify(user_agent: &str) -> Self {
        if user_agent.contains("Chrome") {
            BrowserFamily::Chrome
        } else if user_agent.contains("Firefox") {
            BrowserFamily::Firefox
        } else if user_agent.contains("Safari") {
            BrowserFamily::Safari
        } else if user_agent.contains("Edge") {
            BrowserFamily::Edge
        } else {
            BrowserFamily::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Safari => "Safari",
            BrowserFamily::Edge => "Edge",
            BrowserFamily::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
