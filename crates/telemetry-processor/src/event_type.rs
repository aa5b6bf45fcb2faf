// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry kinds routed by a processor and the bitmask used by units that
//! act on more than one of them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::errors::Error;

/// One of the three record categories a processor routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[repr(u8)]
pub enum TelemetryKind {
    #[display("logs")]
    Logs = 1,
    #[display("metrics")]
    Metrics = 2,
    #[display("traces")]
    Traces = 4,
}

impl TelemetryKind {
    /// Chain order used by `Processor::init`.
    pub const ALL: [TelemetryKind; 3] = [
        TelemetryKind::Logs,
        TelemetryKind::Metrics,
        TelemetryKind::Traces,
    ];

    #[must_use]
    pub const fn bit(self) -> u8 {
        self as u8
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            TelemetryKind::Logs => 0,
            TelemetryKind::Metrics => 1,
            TelemetryKind::Traces => 2,
        }
    }
}

impl TryFrom<u8> for TelemetryKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TelemetryKind::Logs),
            2 => Ok(TelemetryKind::Metrics),
            4 => Ok(TelemetryKind::Traces),
            other => Err(Error::invalid_argument(format!(
                "unknown telemetry kind {other}"
            ))),
        }
    }
}

impl FromStr for TelemetryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logs" => Ok(TelemetryKind::Logs),
            "metrics" => Ok(TelemetryKind::Metrics),
            "traces" => Ok(TelemetryKind::Traces),
            _ => Err(Error::invalid_argument(format!(
                "unknown telemetry kind '{s}'"
            ))),
        }
    }
}

/// Set of telemetry kinds, stored as the `LOGS | METRICS | TRACES` bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventTypes(u8);

impl EventTypes {
    pub const NONE: EventTypes = EventTypes(0);
    pub const LOGS: EventTypes = EventTypes(TelemetryKind::Logs.bit());
    pub const METRICS: EventTypes = EventTypes(TelemetryKind::Metrics.bit());
    pub const TRACES: EventTypes = EventTypes(TelemetryKind::Traces.bit());
    pub const ALL: EventTypes = EventTypes(0b111);

    /// Builds a mask from raw bits, rejecting bits outside the three kinds.
    pub fn from_bits(bits: u8) -> Result<Self, Error> {
        if bits & !Self::ALL.0 != 0 {
            return Err(Error::invalid_argument(format!(
                "unknown telemetry kind bits {bits:#05b}"
            )));
        }
        Ok(EventTypes(bits))
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn union(self, other: EventTypes) -> EventTypes {
        EventTypes(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, kind: TelemetryKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_subset_of(self, other: EventTypes) -> bool {
        self.0 & !other.0 == 0
    }

    /// Kinds in the set, in chain order.
    pub fn iter(self) -> impl Iterator<Item = TelemetryKind> {
        TelemetryKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl From<TelemetryKind> for EventTypes {
    fn from(kind: TelemetryKind) -> Self {
        EventTypes(kind.bit())
    }
}

impl BitOr for EventTypes {
    type Output = EventTypes;

    fn bitor(self, rhs: EventTypes) -> EventTypes {
        self.union(rhs)
    }
}

impl BitOr<TelemetryKind> for EventTypes {
    type Output = EventTypes;

    fn bitor(self, rhs: TelemetryKind) -> EventTypes {
        self.union(rhs.into())
    }
}

impl BitOr for TelemetryKind {
    type Output = EventTypes;

    fn bitor(self, rhs: TelemetryKind) -> EventTypes {
        EventTypes::from(self).union(rhs.into())
    }
}

impl BitOrAssign for EventTypes {
    fn bitor_assign(&mut self, rhs: EventTypes) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = self.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        write!(f, "{}", names.join("|"))
    }
}

impl fmt::Debug for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTypes({self})")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_match_wire_values() {
        assert_eq!(TelemetryKind::Logs.bit(), 1);
        assert_eq!(TelemetryKind::Metrics.bit(), 2);
        assert_eq!(TelemetryKind::Traces.bit(), 4);
    }

    #[test]
    fn test_unknown_kind_is_invalid_argument() {
        assert!(matches!(
            TelemetryKind::try_from(3),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            EventTypes::from_bits(8),
            Err(Error::InvalidArgument(_))
        ));
        assert!("spans".parse::<TelemetryKind>().is_err());
    }

    #[test]
    fn test_mask_operations() {
        let mask = TelemetryKind::Logs | TelemetryKind::Metrics;
        assert!(mask.contains(TelemetryKind::Logs));
        assert!(mask.contains(TelemetryKind::Metrics));
        assert!(!mask.contains(TelemetryKind::Traces));
        assert!(EventTypes::LOGS.is_subset_of(mask));
        assert!(!EventTypes::TRACES.is_subset_of(mask));
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![TelemetryKind::Logs, TelemetryKind::Metrics]
        );
        assert_eq!(mask.to_string(), "logs|metrics");
        assert_eq!(EventTypes::NONE.to_string(), "none");
    }

    #[test]
    fn test_parse_kind_case_insensitive() {
        assert_eq!(
            " Traces ".parse::<TelemetryKind>().unwrap(),
            TelemetryKind::Traces
        );
    }
}
