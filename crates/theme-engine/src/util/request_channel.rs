//! Request/response plumbing between a handle and the task that owns some state.

use tokio::sync::{
    mpsc,
    oneshot,
};
use tracing::{
    error,
    trace,
};

/// Number of requests that may queue up before senders start waiting.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// A request to a specific task
#[derive(Debug)]
pub struct Request<Req, Res, Err> {
    /// Request payload
    pub payload: Req,
    /// Response channel
    pub res_tx: oneshot::Sender<Result<Res, Err>>,
}

impl<Req, Res, Err> Request<Req, Res, Err>
where
    Req: std::fmt::Debug + Send + Sync + 'static,
    Res: std::fmt::Debug + Send + Sync + 'static,
    Err: std::fmt::Debug + std::error::Error + Send + Sync + 'static,
{
    /// Sends the response back to the requester. A requester that has gone away is only logged.
    pub fn respond(self, response: Result<Res, Err>) {
        self.res_tx
            .send(response)
            .map_err(|err| error!(?err, "failed to send response"))
            .ok();
    }
}

/// Helper macro for responding to a request that has partially moved data (eg, the payload)
macro_rules! respond {
    ($req:expr, $res:expr) => {
        $req.res_tx
            .send($res)
            .map_err(|err| tracing::error!(?err, "failed to send response"))
            .ok();
    };
}

pub(crate) use respond;

#[derive(Debug)]
pub struct RequestSender<Req, Res, Err> {
    tx: mpsc::Sender<Request<Req, Res, Err>>,
}

impl<Req, Res, Err> Clone for RequestSender<Req, Res, Err> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<Req, Res, Err> RequestSender<Req, Res, Err>
where
    Req: std::fmt::Debug + Send + Sync + 'static,
    Res: std::fmt::Debug + Send + Sync + 'static,
    Err: std::fmt::Debug + std::error::Error + Send + Sync + 'static,
{
    pub fn new(tx: mpsc::Sender<Request<Req, Res, Err>>) -> Self {
        Self { tx }
    }

    /// Returns [None] if either the request receiver or the response sender went away before a
    /// result was produced.
    pub async fn send_recv(&self, payload: Req) -> Option<Result<Res, Err>> {
        trace!(?payload, "sending payload");
        let (res_tx, res_rx) = oneshot::channel();
        let request = Request { payload, res_tx };

        if (self.tx.send(request).await).is_err() {
            error!("request receiver has closed");
            return None;
        }

        match res_rx.await {
            Ok(res) => Some(res),
            Err(_) => {
                error!("response tx dropped before sending a result");
                None
            },
        }
    }
}

pub type RequestReceiver<Req, Res, Err> = mpsc::Receiver<Request<Req, Res, Err>>;

pub fn new_request_channel<Req, Res, Err>() -> (RequestSender<Req, Res, Err>, RequestReceiver<Req, Res, Err>)
where
    Req: std::fmt::Debug + Send + Sync + 'static,
    Res: std::fmt::Debug + Send + Sync + 'static,
    Err: std::fmt::Debug + std::error::Error + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    (RequestSender::new(tx), rx)
}
