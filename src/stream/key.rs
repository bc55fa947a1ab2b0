use std::fmt;

/// The two upstream feed kinds the manager knows how to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// One candlestick update per tick for a single symbol/interval pair.
    Kline,
    /// One batch of all-symbol price snapshots per tick.
    TickerAll,
}

/// Identifies exactly one upstream feed. Two keys are equal iff every field
/// matches; the registry uses this as its unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub kind: StreamKind,
    pub symbol: Option<String>,
    pub interval: Option<String>,
}

impl StreamKey {
    /// Key for a `<symbol>@kline_<interval>` feed. The symbol is stored
    /// uppercase so that `kline("btcusdt", ..)` and `kline("BTCUSDT", ..)`
    /// address the same connection.
    pub fn kline(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::Kline,
            symbol: Some(symbol.into().to_uppercase()),
            interval: Some(interval.into()),
        }
    }

    /// Key for the `!ticker@arr` all-symbol feed.
    pub fn ticker_all() -> Self {
        Self {
            kind: StreamKind::TickerAll,
            symbol: None,
            interval: None,
        }
    }

    /// A Kline key needs a non-empty symbol and interval; a TickerAll key
    /// carries neither. Anything else is a configuration error surfaced to
    /// the caller of `StreamManager::start`.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            StreamKind::Kline => {
                self.symbol.as_deref().is_some_and(|s| !s.is_empty())
                    && self.interval.as_deref().is_some_and(|i| !i.is_empty())
            }
            StreamKind::TickerAll => self.symbol.is_none() && self.interval.is_none(),
        }
    }

    /// Wire name of the upstream feed (`btcusdt@kline_1m` / `!ticker@arr`),
    /// or `None` for an invalid key.
    pub fn stream_name(&self) -> Option<String> {
        if !self.is_valid() {
            return None;
        }
        match self.kind {
            StreamKind::Kline => Some(format!(
                "{}@kline_{}",
                self.symbol.as_deref().unwrap_or_default().to_lowercase(),
                self.interval.as_deref().unwrap_or_default()
            )),
            StreamKind::TickerAll => Some("!ticker@arr".to_string()),
        }
    }

    /// Parse a wire name back into a key. Returns `None` for stream kinds
    /// the manager does not support.
    pub fn parse(name: &str) -> Option<Self> {
        if name == "!ticker@arr" {
            return Some(Self::ticker_all());
        }
        let (symbol, rest) = name.split_once('@')?;
        let interval = rest.strip_prefix("kline_")?;
        if symbol.is_empty() || interval.is_empty() {
            return None;
        }
        Some(Self::kline(symbol, interval))
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "<invalid stream key>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kline_key_is_case_insensitive_on_symbol() {
        assert_eq!(
            StreamKey::kline("btcusdt", "1m"),
            StreamKey::kline("BTCUSDT", "1m")
        );
    }

    #[test]
    fn kline_wire_name_is_lowercase() {
        let key = StreamKey::kline("ETHUSDT", "5m");
        assert_eq!(key.stream_name().as_deref(), Some("ethusdt@kline_5m"));
        assert_eq!(key.to_string(), "ethusdt@kline_5m");
    }

    #[test]
    fn ticker_wire_name() {
        assert_eq!(
            StreamKey::ticker_all().stream_name().as_deref(),
            Some("!ticker@arr")
        );
    }

    #[test]
    fn kline_without_interval_is_invalid() {
        let key = StreamKey {
            kind: StreamKind::Kline,
            symbol: Some("BTCUSDT".into()),
            interval: None,
        };
        assert!(!key.is_valid());
        assert!(key.stream_name().is_none());
        assert_eq!(key.to_string(), "<invalid stream key>");
    }

    #[test]
    fn kline_with_empty_symbol_is_invalid() {
        assert!(!StreamKey::kline("", "1m").is_valid());
    }

    #[test]
    fn ticker_key_with_symbol_is_invalid() {
        let key = StreamKey {
            kind: StreamKind::TickerAll,
            symbol: Some("BTCUSDT".into()),
            interval: None,
        };
        assert!(!key.is_valid());
    }

    #[test]
    fn parse_round_trips() {
        let kline = StreamKey::parse("btcusdt@kline_1m").unwrap();
        assert_eq!(kline, StreamKey::kline("BTCUSDT", "1m"));
        assert_eq!(kline.stream_name().as_deref(), Some("btcusdt@kline_1m"));

        let ticker = StreamKey::parse("!ticker@arr").unwrap();
        assert_eq!(ticker, StreamKey::ticker_all());
    }

    #[test]
    fn parse_rejects_unknown_stream_kinds() {
        assert!(StreamKey::parse("btcusdt@aggTrade").is_none());
        assert!(StreamKey::parse("btcusdt@depth20").is_none());
        assert!(StreamKey::parse("@kline_1m").is_none());
        assert!(StreamKey::parse("btcusdt@kline_").is_none());
        assert!(StreamKey::parse("garbage").is_none());
    }
}
