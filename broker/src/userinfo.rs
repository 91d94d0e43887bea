//! User information returned on a granted authentication.

use serde::{Deserialize, Serialize};

/// Group a user belongs to, as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Broker-side unique group identifier; empty for local groups.
    pub ugid: String,
}

/// User information sent back to the daemon, which assigns numeric IDs and
/// caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Login name.
    pub name: String,
    /// Broker-side unique user identifier.
    pub uuid: String,
    /// GECOS field.
    pub gecos: String,
    /// Home directory.
    pub dir: String,
    /// Login shell.
    pub shell: String,
    /// Group memberships.
    pub groups: Vec<GroupInfo>,
}

impl UserInfo {
    /// Example user information derived from the user name.
    #[must_use]
    pub fn example(name: &str) -> Self {
        let mut groups = vec![GroupInfo {
            name: format!("group-{name}"),
            ugid: format!("ugid-{name}"),
        }];
        if name == "user-local-groups" {
            groups.push(GroupInfo {
                name: "localgroup".to_string(),
                ugid: String::new(),
            });
        }

        Self {
            name: name.to_string(),
            uuid: format!("uuid-{name}"),
            gecos: format!("gecos for {name}"),
            dir: format!("/home/{name}"),
            shell: "/usr/bin/bash".to_string(),
            groups,
        }
    }

    /// Read the user information out of a granted result payload.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidInput`](crate::BrokerError::InvalidInput)
    /// if the payload carries no user information.
    pub fn from_payload(payload: &str) -> crate::Result<Self> {
        #[derive(Deserialize)]
        struct Payload {
            userinfo: UserInfo,
        }

        serde_json::from_str::<Payload>(payload)
            .map(|payload| payload.userinfo)
            .map_err(|_| crate::BrokerError::InvalidInput)
    }

    /// `{"userinfo": ...}` payload of a granted result.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_payload(&self) -> crate::Result<String> {
        #[derive(Serialize)]
        struct Payload<'a> {
            userinfo: &'a UserInfo,
        }

        serde_json::to_string_pretty(&Payload { userinfo: self })
            .map_err(|e| crate::BrokerError::Internal(format!("Failed to serialize user info: {e}")))
    }
}
