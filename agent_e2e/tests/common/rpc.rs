// Minimal HTTP/1.1 JSON-RPC endpoint for driving `RpcChainClient` end to end.
//
// Every request is answered by a responder closure that returns either
// `{"result": ..}` or `{"error": ..}`; the envelope fields are added here.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

type Responder = dyn Fn(&str, &Value) -> Value + Send + Sync;

pub struct StubNode {
    url: String,
    methods: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl StubNode {
    pub async fn start<F>(respond: F) -> std::io::Result<Self>
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let methods = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);

        let seen = methods.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, respond.clone(), seen.clone()));
            }
        });

        Ok(Self {
            url,
            methods,
            handle,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Methods received so far, in arrival order
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().clone()
    }

    pub fn received(&self, method: &str) -> usize {
        self.methods.lock().iter().filter(|m| *m == method).count()
    }
}

impl Drop for StubNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn result(value: Value) -> Value {
    json!({ "result": value })
}

pub fn error(code: i64, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

async fn serve(mut stream: TcpStream, respond: Arc<Responder>, seen: Arc<Mutex<Vec<String>>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let Some(header_end) = find(&buffer, b"\r\n\r\n") else {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
            continue;
        };

        let body_start = header_end + 4;
        let length = content_length(&buffer[..header_end]);
        if buffer.len() < body_start + length {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
            continue;
        }

        let request: Value =
            serde_json::from_slice(&buffer[body_start..body_start + length]).unwrap_or(Value::Null);
        buffer.drain(..body_start + length);

        let method = request["method"].as_str().unwrap_or_default().to_string();
        seen.lock().push(method.clone());

        let mut reply = respond(&method, &request["params"]);
        reply["jsonrpc"] = json!("2.0");
        reply["id"] = request["id"].clone();
        let body = reply.to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(headers: &[u8]) -> usize {
    String::from_utf8_lossy(headers)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
