use std::collections::VecDeque;
use std::sync::Mutex;

use reqwest::StatusCode;

use crate::{ApiRequest, ApiResponse, Transport};

/// Transport that replays scripted outcomes and records every request.
///
/// Once the script runs out the final outcome keeps repeating.
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

#[derive(Clone)]
pub enum Scripted {
    Status(u16, &'static str),
    Error(&'static str),
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(statuses: &[u16]) -> Self {
        Self::new(statuses.iter().map(|status| Scripted::Status(*status, "")))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self) -> Scripted {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        match self.next() {
            Scripted::Status(status, body) => {
                Ok(ApiResponse::new(StatusCode::from_u16(status)?, body))
            }
            Scripted::Error(message) => Err(anyhow::anyhow!(message)),
        }
    }
}
