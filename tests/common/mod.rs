//! In-process fake Modbus TCP device for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A decoded read request as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function: u8,
    pub address: u16,
    pub quantity: u16,
}

impl Request {
    fn parse(frame: &[u8; 12]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([frame[0], frame[1]]),
            unit_id: frame[6],
            function: frame[7],
            address: u16::from_be_bytes([frame[8], frame[9]]),
            quantity: u16::from_be_bytes([frame[10], frame[11]]),
        }
    }

    fn frame(&self, transaction_id: u16, pdu: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + pdu.len());
        out.extend_from_slice(&transaction_id.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00]);
        out.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        out.push(self.unit_id);
        out.extend_from_slice(pdu);
        out
    }

    /// Register response echoing the request's transaction id.
    pub fn registers(&self, values: &[u16]) -> Reply {
        self.registers_with_tid(self.transaction_id, values)
    }

    pub fn registers_with_tid(&self, transaction_id: u16, values: &[u16]) -> Reply {
        let mut pdu = vec![self.function, (values.len() * 2) as u8];
        for value in values {
            pdu.extend_from_slice(&value.to_be_bytes());
        }
        Reply::Frame(self.frame(transaction_id, &pdu))
    }

    pub fn coils(&self, packed: &[u8]) -> Reply {
        let mut pdu = vec![self.function, packed.len() as u8];
        pdu.extend_from_slice(packed);
        Reply::Frame(self.frame(self.transaction_id, &pdu))
    }

    pub fn exception(&self, code: u8) -> Reply {
        Reply::Frame(self.frame(self.transaction_id, &[self.function | 0x80, code]))
    }
}

/// What the device does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Frame(Vec<u8>),
    /// Answer after a pause
    Delayed(Duration, Vec<u8>),
    /// Read the request and never answer
    Silent,
    /// Drop the connection without answering
    Close,
}

impl Reply {
    /// Send a frame reply only after `pause`.
    pub fn after(self, pause: Duration) -> Reply {
        match self {
            Reply::Frame(bytes) => Reply::Delayed(pause, bytes),
            other => other,
        }
    }
}

type Handler = dyn Fn(&Request) -> Reply + Send + Sync;

pub struct FakeDevice {
    pub port: u16,
    requests: Arc<Mutex<Vec<Request>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        socket,
                        Arc::clone(&handler),
                        Arc::clone(&requests),
                    ));
                }
            })
        };

        Self {
            port,
            requests,
            connections,
            task,
        }
    }

    /// Device backed by register maps. Unknown addresses answer with
    /// exception 0x02 (illegal data address).
    pub async fn with_registers(
        holding: HashMap<u16, u16>,
        input: HashMap<u16, u16>,
        online: Arc<AtomicBool>,
    ) -> Self {
        Self::start(move |req| {
            if !online.load(Ordering::SeqCst) {
                return Reply::Close;
            }
            let map = match req.function {
                0x03 => &holding,
                0x04 => &input,
                _ => return req.exception(0x01),
            };
            let values: Option<Vec<u16>> = (req.address..req.address + req.quantity)
                .map(|addr| map.get(&addr).copied())
                .collect();
            match values {
                Some(values) => req.registers(&values),
                None => req.exception(0x02),
            }
        })
        .await
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, handler: Arc<Handler>, requests: Arc<Mutex<Vec<Request>>>) {
    let mut frame = [0u8; 12];
    while socket.read_exact(&mut frame).await.is_ok() {
        let request = Request::parse(&frame);
        requests.lock().unwrap().push(request);
        match handler(&request) {
            Reply::Frame(bytes) => {
                if socket.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::Delayed(pause, bytes) => {
                tokio::time::sleep(pause).await;
                if socket.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::Silent => {}
            Reply::Close => return,
        }
    }
}
