//! RPC message model.
//!
//! Every request travels as `{"type": "<NAME>", "keys": [..], "args": [..]}`.
//! `WireMessage` is that raw shape; `Request` is the validated form the
//! dispatcher and client work with.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Amplitude, Circuit, QstateKey};

use crate::error::ProtocolError;

/// Request kinds understood by the state manager.
///
/// Declaration order is the order used in the timing log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Get,
    Set,
    Run,
    Remove,
    Terminate,
    Close,
    Connect,
    Connected,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Get,
        MessageType::Set,
        MessageType::Run,
        MessageType::Remove,
        MessageType::Terminate,
        MessageType::Close,
        MessageType::Connect,
        MessageType::Connected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Get => "GET",
            MessageType::Set => "SET",
            MessageType::Run => "RUN",
            MessageType::Remove => "REMOVE",
            MessageType::Terminate => "TERMINATE",
            MessageType::Close => "CLOSE",
            MessageType::Connect => "CONNECT",
            MessageType::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw wire shape of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub keys: Vec<QstateKey>,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl WireMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            keys: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Amplitudes arrive either as `[re, im]` or as a bare real number.
#[derive(Deserialize)]
#[serde(untagged)]
enum AmplitudeRepr {
    Pair([f64; 2]),
    Real(f64),
}

impl From<AmplitudeRepr> for Amplitude {
    fn from(repr: AmplitudeRepr) -> Self {
        match repr {
            AmplitudeRepr::Pair([re, im]) => Amplitude::new(re, im),
            AmplitudeRepr::Real(re) => Amplitude::new(re, 0.0),
        }
    }
}

/// Validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get {
        key: QstateKey,
    },
    Set {
        keys: Vec<QstateKey>,
        amplitudes: Vec<Amplitude>,
    },
    /// `keys` lists every key whose state the circuit touches; `binding`
    /// maps circuit qubit `i` to `binding[i]`.
    Run {
        keys: Vec<QstateKey>,
        circuit: Circuit,
        binding: Vec<QstateKey>,
    },
    Remove {
        key: QstateKey,
    },
    Terminate,
    Close,
    Connect,
    Connected,
}

impl Request {
    /// RUN where the touched keys are exactly the bound keys.
    pub fn run(circuit: Circuit, keys: Vec<QstateKey>) -> Self {
        Request::Run {
            binding: keys.clone(),
            keys,
            circuit,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Get { .. } => MessageType::Get,
            Request::Set { .. } => MessageType::Set,
            Request::Run { .. } => MessageType::Run,
            Request::Remove { .. } => MessageType::Remove,
            Request::Terminate => MessageType::Terminate,
            Request::Close => MessageType::Close,
            Request::Connect => MessageType::Connect,
            Request::Connected => MessageType::Connected,
        }
    }

    /// Whether the server writes a frame back for this request.
    ///
    /// RUN answers only when the circuit measures something.
    pub fn expects_response(&self) -> bool {
        match self {
            Request::Get { .. } | Request::Connect => true,
            Request::Run { circuit, .. } => !circuit.measured_qubits().is_empty(),
            _ => false,
        }
    }

    pub fn to_wire(&self) -> Result<WireMessage, ProtocolError> {
        let mut wire = WireMessage::new(self.message_type());
        match self {
            Request::Get { key } => {
                wire.keys = vec![*key];
                wire.args = vec![Value::from(1)];
            }
            Request::Set { keys, amplitudes } => {
                wire.keys = keys.clone();
                wire.args = vec![serde_json::to_value(amplitudes)?];
            }
            Request::Run {
                keys,
                circuit,
                binding,
            } => {
                wire.keys = keys.clone();
                wire.args = vec![serde_json::to_value(circuit)?, serde_json::to_value(binding)?];
            }
            Request::Remove { key } => wire.keys = vec![*key],
            Request::Terminate | Request::Close | Request::Connect | Request::Connected => {}
        }
        Ok(wire)
    }

    pub fn from_wire(wire: WireMessage) -> Result<Self, ProtocolError> {
        let message_type = wire.message_type;
        let WireMessage { keys, mut args, .. } = wire;

        let request = match message_type {
            MessageType::Get => {
                let valid_args = match args.as_slice() {
                    [] => true,
                    [count] => count.as_u64() == Some(1),
                    _ => false,
                };
                if !valid_args {
                    return Err(ProtocolError::malformed(
                        message_type,
                        format!("args must be [] or [1], got {args:?}"),
                    ));
                }
                Request::Get {
                    key: single_key(message_type, &keys)?,
                }
            }
            MessageType::Set => {
                if args.len() != 1 {
                    return Err(ProtocolError::malformed(
                        message_type,
                        format!("expected 1 argument, got {}", args.len()),
                    ));
                }
                let reprs: Vec<AmplitudeRepr> = serde_json::from_value(args.remove(0))?;
                Request::Set {
                    keys,
                    amplitudes: reprs.into_iter().map(Amplitude::from).collect(),
                }
            }
            MessageType::Run => {
                if args.len() != 2 {
                    return Err(ProtocolError::malformed(
                        message_type,
                        format!("expected [circuit, keys], got {} arguments", args.len()),
                    ));
                }
                let binding: Vec<QstateKey> = serde_json::from_value(args.remove(1))?;
                let circuit: Circuit = serde_json::from_value(args.remove(0))?;
                Request::Run {
                    keys,
                    circuit,
                    binding,
                }
            }
            MessageType::Remove => Request::Remove {
                key: single_key(message_type, &keys)?,
            },
            MessageType::Terminate => Request::Terminate,
            MessageType::Close => Request::Close,
            MessageType::Connect => Request::Connect,
            MessageType::Connected => Request::Connected,
        };
        Ok(request)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.to_wire()?.encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_wire(WireMessage::decode(bytes)?)
    }
}

fn single_key(message_type: MessageType, keys: &[QstateKey]) -> Result<QstateKey, ProtocolError> {
    match keys {
        [key] => Ok(*key),
        _ => Err(ProtocolError::malformed(
            message_type,
            format!("expected exactly one key, got {}", keys.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_round_trip_carries_count_argument() {
        let request = Request::Get { key: 7 };
        let wire = request.to_wire().unwrap();
        assert_eq!(wire.keys, vec![7]);
        assert_eq!(wire.args, vec![json!(1)]);

        let decoded = Request::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_get_accepts_empty_args() {
        let bytes = br#"{"type":"GET","keys":[3],"args":[]}"#;
        assert_eq!(Request::decode(bytes).unwrap(), Request::Get { key: 3 });
    }

    #[test]
    fn test_get_rejects_other_counts() {
        let bytes = br#"{"type":"GET","keys":[3],"args":[2]}"#;
        assert!(matches!(
            Request::decode(bytes),
            Err(ProtocolError::Malformed {
                message_type: MessageType::Get,
                ..
            })
        ));
    }

    #[test]
    fn test_set_accepts_pairs_and_bare_reals() {
        let bytes = br#"{"type":"SET","keys":[0],"args":[[[0.6, 0.0], 0.8]]}"#;
        let Request::Set { keys, amplitudes } = Request::decode(bytes).unwrap() else {
            panic!("expected SET");
        };
        assert_eq!(keys, vec![0]);
        assert_eq!(
            amplitudes,
            vec![Amplitude::new(0.6, 0.0), Amplitude::new(0.8, 0.0)]
        );
    }

    #[test]
    fn test_set_writes_amplitudes_as_pairs() {
        let request = Request::Set {
            keys: vec![1],
            amplitudes: vec![Amplitude::new(0.0, 1.0), Amplitude::new(0.0, 0.0)],
        };
        let value: Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "SET", "keys": [1], "args": [[[0.0, 1.0], [0.0, 0.0]]]})
        );
    }

    #[test]
    fn test_run_keeps_binding_separate_from_keys() {
        let mut circuit = Circuit::new(1);
        circuit.measure(0);
        let request = Request::Run {
            keys: vec![4, 5],
            circuit,
            binding: vec![5],
        };
        let decoded = Request::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
        assert!(decoded.expects_response());
    }

    #[test]
    fn test_run_without_measurement_expects_no_response() {
        let mut circuit = Circuit::new(1);
        circuit.h(0);
        assert!(!Request::run(circuit, vec![0]).expects_response());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let bytes = br#"{"type":"NEW","keys":[],"args":[]}"#;
        assert!(matches!(Request::decode(bytes), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_control_messages_have_empty_payload() {
        for request in [
            Request::Terminate,
            Request::Close,
            Request::Connect,
            Request::Connected,
        ] {
            let wire = request.to_wire().unwrap();
            assert!(wire.keys.is_empty() && wire.args.is_empty());
            assert!(!matches!(request, Request::Connect) || request.expects_response());
        }
    }

    #[test]
    fn test_type_names_match_wire_form() {
        for message_type in MessageType::ALL {
            let value = serde_json::to_value(message_type).unwrap();
            assert_eq!(value, json!(message_type.as_str()));
        }
    }
}
