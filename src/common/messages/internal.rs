use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingMessage {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: [u8; 4],

    #[serde(default)]
    #[serde(rename = "v", with = "serde_bytes")]
    pub version: Option<[u8; 4]>,

    #[serde(flatten)]
    pub variant: RingMessageVariant,
}

impl RingMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<RingMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum RingMessageVariant {
    #[serde(rename = "q")]
    Request(RingRequestSpecific),

    #[serde(rename = "r")]
    Response(RingResponseSpecific),

    #[serde(rename = "e")]
    Error(RingErrorSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum RingRequestSpecific {
    #[serde(rename = "ping")]
    Ping {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "get_successor")]
    GetSuccessor {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "get_predecessor")]
    GetPredecessor {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "find_closest_predecessor")]
    FindClosestPredecessor {
        #[serde(rename = "a")]
        arguments: RingFindClosestPredecessorRequestArguments,
    },

    #[serde(rename = "notify")]
    Notify {
        #[serde(rename = "a")]
        arguments: RingIdArguments,
    },

    #[serde(rename = "alert")]
    Alert {
        #[serde(rename = "a")]
        arguments: RingAlertRequestArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)] // This means order matters! Order these from most to least detailed
pub enum RingResponseSpecific {
    ClosestPredecessor {
        #[serde(rename = "r")]
        arguments: RingClosestPredecessorResponseArguments,
    },

    Node {
        #[serde(rename = "r")]
        arguments: RingNodeResponseArguments,
    },

    Ping {
        #[serde(rename = "r")]
        arguments: RingIdArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingErrorSpecific {
    #[serde(rename = "e")]
    pub error_info: (i32, String),
}

// === Shared by ping, get_successor, get_predecessor and notify ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingIdArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],
}

// === FIND CLOSEST PREDECESSOR ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingFindClosestPredecessorRequestArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    #[serde(with = "serde_bytes")]
    pub target: [u8; 20],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingClosestPredecessorResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    #[serde(with = "serde_bytes")]
    pub node: Box<[u8]>,

    #[serde(with = "serde_bytes")]
    pub successor: Box<[u8]>,
}

// === GET SUCCESSOR / GET PREDECESSOR ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingNodeResponseArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    /// Compact node, empty when the responder has none.
    #[serde(with = "serde_bytes")]
    pub node: Box<[u8]>,
}

// === ALERT ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RingAlertRequestArguments {
    #[serde(with = "serde_bytes")]
    pub id: [u8; 20],

    #[serde(with = "serde_bytes")]
    pub node: Box<[u8]>,
}
