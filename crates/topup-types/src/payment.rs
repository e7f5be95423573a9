use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChannel {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub fee_flat: f64,
    #[serde(default)]
    pub fee_percent: f64,
    #[serde(default)]
    pub min_amount: f64,
    #[serde(default)]
    pub max_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChannelGroup {
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub channels: Vec<PaymentChannel>,
}

/// Partial admin update of a payment channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentChannelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_flat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeCalculationRequest {
    pub amount: f64,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCalculation {
    pub fee_amount: f64,
    pub total: f64,
}

/// Back-office dashboard counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_transactions: u64,
    pub total_revenue: f64,
    pub pending_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouped_channels() {
        let groups: Vec<PaymentChannelGroup> = serde_json::from_value(serde_json::json!([
            {
                "provider": "tripay",
                "type": "ewallet",
                "channels": [
                    {"id": "c-1", "code": "OVO", "name": "OVO", "type": "ewallet",
                     "fee_flat": 0, "fee_percent": 1.5}
                ]
            }
        ]))
        .unwrap();
        assert_eq!(groups[0].kind, "ewallet");
        assert_eq!(groups[0].channels[0].fee_percent, 1.5);
        assert_eq!(groups[0].channels[0].is_active, None);
    }
}
