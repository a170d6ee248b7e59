use serde::{Deserialize, Serialize};

/// One accounting record: who called, over which session, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub session_info: SessionInfo,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Name of the component that served the call.
    pub component_name: String,
}

/// Transport session the call arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub local_address: String,
    pub local_port: u32,
    pub remote_address: String,
    pub remote_port: u32,
    /// IANA protocol number (6 for TCP, 17 for UDP, ...); 0 when unknown.
    pub ip_proto: u32,
    pub status: SessionStatus,
    pub user: UserDetail,
}

/// Lifecycle state of the session at the time of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "SESSION_STATUS_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "SESSION_STATUS_LOGIN")]
    Login,
    #[serde(rename = "SESSION_STATUS_LOGOUT")]
    Logout,
    #[serde(rename = "SESSION_STATUS_ONCE")]
    Once,
    #[serde(rename = "SESSION_STATUS_ENABLE")]
    Enable,
    /// An operation within an established session; every intercepted call.
    #[serde(rename = "SESSION_STATUS_OPERATION")]
    Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    pub identity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_wire_names() {
        let json = serde_json::to_string(&SessionStatus::Operation).unwrap();
        assert_eq!(json, "\"SESSION_STATUS_OPERATION\"");
        let status: SessionStatus = serde_json::from_str("\"SESSION_STATUS_LOGIN\"").unwrap();
        assert_eq!(status, SessionStatus::Login);
    }

    #[test]
    fn record_serializes_as_one_object() {
        let record = Record {
            session_info: SessionInfo {
                local_address: "192.0.2.1".into(),
                local_port: 9339,
                remote_address: "192.0.2.2".into(),
                remote_port: 40000,
                ip_proto: 6,
                status: SessionStatus::Operation,
                user: UserDetail {
                    identity: "spiffe://td/client".into(),
                },
            },
            timestamp: chrono::Utc::now(),
            component_name: "interzept".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["session_info"]["ip_proto"], 6);
        assert_eq!(value["session_info"]["user"]["identity"], "spiffe://td/client");
        assert_eq!(value["component_name"], "interzept");
        assert!(value["timestamp"].is_string());
    }
}
