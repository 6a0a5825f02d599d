//! The gate/security-relevant slice of an event.
//!
//! The surrounding platform owns the full event record; the check-in core
//! only needs the signing secret, the gate layout, and the timing rules.

use crate::ids::{EventId, GateId};
use crate::signer::SigningSecret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Classification of a ticket type for gate authorization. Serialized as a
/// one-letter code in manifests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketClass {
    /// Admitted through general gates only
    #[serde(rename = "G")]
    General,
    /// Admitted through general and VIP gates
    #[serde(rename = "V")]
    Vip,
}

impl TicketClass {
    /// Classify a ticket type name. Any type whose name contains "vip"
    /// (case-insensitive) is VIP.
    #[must_use]
    pub fn of(ticket_type: &str) -> Self {
        if ticket_type.to_ascii_lowercase().contains("vip") {
            Self::Vip
        } else {
            Self::General
        }
    }
}

/// How a gate id relates to an event's gate configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateKind {
    /// Listed as a general gate
    General,
    /// Listed as a VIP-restricted gate
    Vip,
    /// Not configured for this event
    Unknown,
}

/// Event configuration consumed by validation, check-in and manifests.
#[derive(Clone, Debug)]
pub struct EventSecurityConfig {
    /// Event id
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Event-scoped signing secret
    pub secret: SigningSecret,
    /// General entry gates
    pub gates: BTreeSet<GateId>,
    /// VIP-restricted gates
    pub vip_gates: BTreeSet<GateId>,
    /// Master switch for check-in
    pub check_in_enabled: bool,
    /// Check-in window start (`None` = unrestricted)
    pub opens_at: Option<DateTime<Utc>>,
    /// Check-in window end (`None` = unrestricted)
    pub closes_at: Option<DateTime<Utc>>,
    /// Event start
    pub starts_at: DateTime<Utc>,
    /// Event end (`None` = open-ended)
    pub ends_at: Option<DateTime<Utc>>,
}

impl EventSecurityConfig {
    /// Classify a gate against this event's configuration.
    ///
    /// A gate listed in both sets is treated as VIP-restricted.
    #[must_use]
    pub fn gate_kind(&self, gate: &GateId) -> GateKind {
        if self.vip_gates.contains(gate) {
            GateKind::Vip
        } else if self.gates.contains(gate) {
            GateKind::General
        } else {
            GateKind::Unknown
        }
    }

    /// Whether a ticket of the given type may enter through `gate`.
    #[must_use]
    pub fn admits_at_gate(&self, gate: &GateId, ticket_type: &str) -> bool {
        match self.gate_kind(gate) {
            GateKind::General => true,
            GateKind::Vip => TicketClass::of(ticket_type) == TicketClass::Vip,
            GateKind::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> EventSecurityConfig {
        EventSecurityConfig {
            id: EventId::new(),
            name: "Test Night".to_string(),
            secret: SigningSecret::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap(),
            gates: [GateId::from("main")].into_iter().collect(),
            vip_gates: [GateId::from("vip-north")].into_iter().collect(),
            check_in_enabled: true,
            opens_at: None,
            closes_at: None,
            starts_at: Utc::now(),
            ends_at: None,
        }
    }

    #[test]
    fn vip_classification_is_case_insensitive() {
        assert_eq!(TicketClass::of("VIP Lounge"), TicketClass::Vip);
        assert_eq!(TicketClass::of("Early Bird vip"), TicketClass::Vip);
        assert_eq!(TicketClass::of("General Admission"), TicketClass::General);
    }

    #[test]
    fn vip_gate_rejects_general_tickets() {
        let event = config();
        assert!(event.admits_at_gate(&GateId::from("main"), "General Admission"));
        assert!(event.admits_at_gate(&GateId::from("main"), "VIP"));
        assert!(event.admits_at_gate(&GateId::from("vip-north"), "VIP"));
        assert!(!event.admits_at_gate(&GateId::from("vip-north"), "General Admission"));
        assert!(!event.admits_at_gate(&GateId::from("side"), "VIP"));
    }
}
