//! Data channel naming.
//!
//! A subscription channel is addressed as `/{channel_type}/{id1,id2,...}`.

use std::borrow::Borrow;
use std::fmt;

use super::error::PushError;

/// Data channel types offered by the push server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Account balance updates.
    Accounts,
    /// Instrument quotes.
    Quotes,
    /// Order book depth.
    OrderDepths,
    /// Executed trades for an instrument.
    Trades,
    /// Per-broker trade summary for an instrument.
    BrokerTradeSummary,
    /// Account positions.
    Positions,
    /// Account orders.
    Orders,
    /// Account deals.
    Deals,
}

impl ChannelType {
    /// All channel types.
    pub const ALL: [ChannelType; 8] = [
        ChannelType::Accounts,
        ChannelType::Quotes,
        ChannelType::OrderDepths,
        ChannelType::Trades,
        ChannelType::BrokerTradeSummary,
        ChannelType::Positions,
        ChannelType::Orders,
        ChannelType::Deals,
    ];

    /// Channel types that accept several ids in one subscription.
    pub const MULTI_ID: [ChannelType; 3] =
        [ChannelType::Orders, ChannelType::Deals, ChannelType::Positions];

    /// Wire name used as the first channel segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Accounts => "accounts",
            ChannelType::Quotes => "quotes",
            ChannelType::OrderDepths => "orderdepths",
            ChannelType::Trades => "trades",
            ChannelType::BrokerTradeSummary => "brokertradesummary",
            ChannelType::Positions => "positions",
            ChannelType::Orders => "orders",
            ChannelType::Deals => "deals",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == name)
    }

    /// Whether one subscription may cover several ids.
    pub fn supports_multiple_ids(&self) -> bool {
        Self::MULTI_ID.contains(self)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated subscription channel string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionChannel(String);

impl SubscriptionChannel {
    /// Build the channel for `channel_type` and `ids`.
    ///
    /// Per-instrument channels take exactly one id; only account-level
    /// channels ([`ChannelType::MULTI_ID`]) may take several.
    pub fn new<S: AsRef<str>>(channel_type: ChannelType, ids: &[S]) -> Result<Self, PushError> {
        if ids.is_empty() {
            return Err(PushError::InvalidArgument(format!(
                "no ids given for channel {channel_type}"
            )));
        }

        if ids.len() > 1 && !channel_type.supports_multiple_ids() {
            return Err(PushError::InvalidArgument(format!(
                "multiple ids are only supported for {:?}, not {channel_type}",
                ChannelType::MULTI_ID.map(|ty| ty.as_str())
            )));
        }

        let mut joined = String::new();
        for (i, id) in ids.iter().enumerate() {
            let id = id.as_ref();
            if id.is_empty() || id.contains([',', '/']) {
                return Err(PushError::InvalidArgument(format!("invalid id {id:?}")));
            }
            if i > 0 {
                joined.push(',');
            }
            joined.push_str(id);
        }

        Ok(Self(format!("/{channel_type}/{joined}")))
    }

    /// Wrap a channel string received from the wire without validation.
    pub fn from_wire(channel: impl Into<String>) -> Self {
        Self(channel.into())
    }

    /// The channel string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SubscriptionChannel {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SubscriptionChannel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
