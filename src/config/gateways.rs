use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Gateway, GatewayType};

pub const GATEWAY_SOCIALPAY: &str = "SOCIALPAY";
pub const GATEWAY_CYBERSOURCE: &str = "CYBERSOURCE";
pub const GATEWAY_CBE: &str = "CBE";

/// Read-only gateway catalog, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct GatewayCatalog {
    inner: HashMap<String, Gateway>,
}

impl GatewayCatalog {
    pub fn new(gateways: Vec<Gateway>) -> Self {
        let inner = gateways.into_iter().map(|g| (g.key.clone(), g)).collect();
        Self { inner }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            gateway(GATEWAY_SOCIALPAY, "SocialPay Wallet", GatewayType::Wallet, true, true),
            gateway(GATEWAY_CYBERSOURCE, "Visa / Mastercard", GatewayType::Card, true, false),
            gateway(GATEWAY_CBE, "Commercial Bank of Ethiopia", GatewayType::Bank, true, true),
        ])
    }

    pub fn get(&self, key: &str) -> Option<Gateway> {
        self.inner.get(key).cloned()
    }

    pub fn all(&self) -> Vec<Gateway> {
        let mut gateways: Vec<Gateway> = self.inner.values().cloned().collect();
        gateways.sort_by(|a, b| a.key.cmp(&b.key));
        gateways
    }
}

fn gateway(
    key: &str,
    name: &str,
    gateway_type: GatewayType,
    can_process: bool,
    can_settle: bool,
) -> Gateway {
    Gateway {
        id: Uuid::new_v4(),
        key: key.to_string(),
        name: name.to_string(),
        gateway_type,
        can_process,
        can_settle,
    }
}
