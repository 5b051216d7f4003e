//! A scripted stand-in for a bulb, listening on loopback.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// What the bulb does with the `n`th datagram (0-based) it receives.
pub enum Reply {
    /// Say nothing.
    Silent,
    /// Send these datagrams back right away.
    Now(Vec<Vec<u8>>),
    /// Send these datagrams back after a pause.
    Later(Duration, Vec<Vec<u8>>),
}

type Script = dyn Fn(usize, &Value) -> Reply + Send + Sync;

pub struct MockBulb {
    addr: SocketAddr,
    raw: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl MockBulb {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(usize, &Value) -> Reply + Send + Sync + 'static,
    {
        let socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
                .await
                .expect("bind mock bulb"),
        );
        let addr = socket.local_addr().expect("mock address");
        let raw = Arc::new(Mutex::new(Vec::new()));
        let script: Arc<Script> = Arc::new(script);

        let task = tokio::spawn({
            let raw = Arc::clone(&raw);
            async move {
                let mut buf = [0u8; 4096];
                loop {
                    let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                        return;
                    };
                    let bytes = buf[..len].to_vec();
                    let n = {
                        let mut raw = raw.lock().unwrap();
                        raw.push(bytes.clone());
                        raw.len() - 1
                    };
                    let request: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
                    match script(n, &request) {
                        Reply::Silent => {}
                        Reply::Now(replies) => {
                            for reply in replies {
                                let _ = socket.send_to(&reply, from).await;
                            }
                        }
                        Reply::Later(delay, replies) => {
                            let socket = Arc::clone(&socket);
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                for reply in replies {
                                    let _ = socket.send_to(&reply, from).await;
                                }
                            });
                        }
                    }
                }
            }
        });

        MockBulb { addr, raw, task }
    }

    /// A bulb that never answers.
    pub async fn silent() -> Self {
        Self::start(|_, _| Reply::Silent).await
    }

    /// A bulb that acknowledges every command with `success: true`.
    pub async fn acking() -> Self {
        Self::start(|_, req| Reply::Now(vec![encode(&ack(req, true))])).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Raw bytes of every datagram received so far.
    pub fn raw(&self) -> Vec<Vec<u8>> {
        self.raw.lock().unwrap().clone()
    }

    /// Every datagram received so far, decoded.
    pub fn received(&self) -> Vec<Value> {
        self.raw()
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.raw.lock().unwrap().len()
    }
}

impl Drop for MockBulb {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

pub fn request_id(req: &Value) -> u64 {
    req["id"].as_u64().expect("request carries a numeric id")
}

pub fn ack(req: &Value, success: bool) -> Value {
    json!({
        "id": req["id"],
        "method": req["method"],
        "env": "pro",
        "result": {"success": success}
    })
}

pub fn device_error(req: &Value, code: i64, message: &str) -> Value {
    json!({
        "id": req["id"],
        "method": req["method"],
        "env": "pro",
        "error": {"code": code, "message": message}
    })
}

pub fn pilot(req: &Value) -> Value {
    json!({
        "id": req["id"],
        "method": "getPilot",
        "env": "pro",
        "result": {
            "mac": "a8bb50aabbcc",
            "rssi": -58,
            "src": "udp",
            "sceneId": 0,
            "state": true,
            "r": 10, "g": 20, "b": 30, "c": 0, "w": 0,
            "dimming": 55
        }
    })
}
