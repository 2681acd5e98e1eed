use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rpcprims::call::{CallError, CancellationToken, RequestBody};
use rpcprims::frame::{decode_message, encode_message};
use rpcprims::transport::{body_channel, response_channel, CollectedResponse, ResponseEvent};
use rpcprims::{
    CallContext, CallOptions, ClientStreamingExecutor, HandlerError, HandlerResult,
    JsonMarshaller, MessageReader, MethodRegistry, Status, StatusCode,
};
use serde::{Deserialize, Serialize};

const ACCUMULATE: &str = "/count.Counter/AccumulateCount";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CounterRequest {
    count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CounterReply {
    count: i32,
}

fn wire(counts: &[i32]) -> Vec<u8> {
    let mut out = BytesMut::new();
    for count in counts {
        let payload =
            serde_json::to_vec(&CounterRequest { count: *count }).expect("request should encode");
        encode_message(&payload, &mut out).expect("frame should encode");
    }
    out.to_vec()
}

fn counter_executor<H>(handler: H) -> ClientStreamingExecutor<CounterRequest, CounterReply>
where
    H: rpcprims::call::ClientStreamingHandler<CounterRequest, CounterReply>,
{
    ClientStreamingExecutor::new(
        ACCUMULATE,
        handler,
        JsonMarshaller::new(),
        JsonMarshaller::new(),
    )
}

async fn call(
    exec: &ClientStreamingExecutor<CounterRequest, CounterReply>,
    body: Vec<u8>,
) -> (Status, CollectedResponse) {
    let (mut sink, rx) = response_channel();
    let status = exec
        .run(std::io::Cursor::new(body), &mut sink, CallContext::new(ACCUMULATE))
        .await;
    drop(sink);
    (status, rx.collect().await)
}

fn reply(data: &Bytes) -> CounterReply {
    let mut buf = BytesMut::from(data.as_ref());
    let payload = decode_message(&mut buf, None)
        .expect("response should be well framed")
        .expect("response should hold one message");
    assert!(buf.is_empty(), "exactly one response message");
    serde_json::from_slice(&payload).expect("reply should decode")
}

fn grpc_status(response: &CollectedResponse) -> (String, Option<String>) {
    let trailers = response.trailers.as_ref().expect("trailers should be sent");
    (
        trailers
            .get("grpc-status")
            .expect("status trailer present")
            .to_string(),
        trailers.get("grpc-message").map(str::to_string),
    )
}

async fn accumulate(
    mut requests: MessageReader<CounterRequest>,
    _ctx: CallContext,
) -> HandlerResult<CounterReply> {
    let mut total = 0;
    while requests.advance().await? {
        total += requests.current()?.count;
    }
    Ok(Some(CounterReply { count: total }))
}

#[tokio::test]
async fn two_messages_accumulate_to_two() {
    let exec = counter_executor(accumulate);
    let (status, response) = call(&exec, wire(&[1, 1])).await;

    assert_eq!(status, Status::ok());
    assert_eq!(reply(&response.data), CounterReply { count: 2 });
    assert_eq!(grpc_status(&response), ("0".to_string(), None));
}

#[tokio::test]
async fn truncated_trailing_frame_is_incomplete_message() {
    let mut body = wire(&[1]);
    body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x0B, b'{']);

    let exec = counter_executor(accumulate);
    let (status, response) = call(&exec, body).await;

    assert_eq!(status.code(), StatusCode::Internal);
    assert!(response.data.is_empty());
    assert_eq!(
        grpc_status(&response),
        ("13".to_string(), Some("Incomplete message.".to_string()))
    );
}

#[tokio::test]
async fn truncated_header_is_incomplete_message() {
    let mut body = wire(&[1, 2]);
    body.extend_from_slice(&[0x00, 0x00]);

    let exec = counter_executor(accumulate);
    let (status, _) = call(&exec, body).await;

    assert_eq!(status.code(), StatusCode::Internal);
    assert_eq!(status.message(), Some("Incomplete message."));
}

#[tokio::test]
async fn returning_nothing_is_cancelled() {
    async fn drain_only(
        mut requests: MessageReader<CounterRequest>,
        _ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        while requests.advance().await? {}
        Ok(None)
    }

    let exec = counter_executor(drain_only);
    let (status, response) = call(&exec, wire(&[1, 2, 3])).await;

    assert_eq!(status.code(), StatusCode::Cancelled);
    assert!(response.data.is_empty());
    assert_eq!(
        grpc_status(&response),
        (
            "1".to_string(),
            Some("No message returned from method.".to_string())
        )
    );
}

#[tokio::test]
async fn self_cancel_at_three_replies_three() {
    async fn stop_at_three(
        mut requests: MessageReader<CounterRequest>,
        ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        let mut total = 0;
        loop {
            match requests.advance().await {
                Ok(true) => {
                    total += requests.current()?.count;
                    if total >= 3 {
                        ctx.cancel();
                    }
                }
                Ok(false) => break,
                Err(CallError::Cancelled) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Some(CounterReply { count: total }))
    }

    let exec = counter_executor(stop_at_three);
    let (status, response) = call(&exec, wire(&[1, 1, 1, 1, 1])).await;

    assert_eq!(status.code(), StatusCode::Ok);
    assert_eq!(reply(&response.data), CounterReply { count: 3 });
}

#[tokio::test]
async fn handler_token_stops_reading_without_cancelling_call() {
    async fn stop_with_own_token(
        mut requests: MessageReader<CounterRequest>,
        ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        let stop = CancellationToken::new();
        let mut total = 0;
        while let Ok(true) = requests.advance_with(&stop).await {
            total += requests.current()?.count;
            if total >= 3 {
                stop.cancel();
            }
        }
        assert!(!ctx.is_cancelled());
        Ok(Some(CounterReply { count: total }))
    }

    let exec = counter_executor(stop_with_own_token);
    let (status, response) = call(&exec, wire(&[2, 1, 4, 4])).await;

    assert_eq!(status.code(), StatusCode::Ok);
    assert_eq!(reply(&response.data), CounterReply { count: 3 });
}

#[tokio::test]
async fn messages_arrive_in_order_across_chunks() {
    async fn collect_order(
        mut requests: MessageReader<CounterRequest>,
        _ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        let mut previous = 0;
        while let Some(message) = requests.next_message().await? {
            if message.count != previous + 1 {
                return Err(Status::invalid_argument(format!(
                    "expected {} got {}",
                    previous + 1,
                    message.count
                ))
                .into());
            }
            previous = message.count;
        }
        Ok(Some(CounterReply { count: previous }))
    }

    let (tx, body) = body_channel();
    let client = tokio::spawn(async move {
        let bytes = wire(&[1, 2, 3, 4, 5, 6, 7]);
        for chunk in bytes.chunks(3) {
            tx.send(Bytes::copy_from_slice(chunk))
                .expect("body receiver alive");
            tokio::task::yield_now().await;
        }
        tx.finish();
    });

    let exec = counter_executor(collect_order);
    let (mut sink, rx) = response_channel();
    let status = exec.run(body, &mut sink, CallContext::new(ACCUMULATE)).await;
    drop(sink);
    client.await.expect("client task should finish");

    assert_eq!(status.code(), StatusCode::Ok);
    assert_eq!(reply(&rx.collect().await.data), CounterReply { count: 7 });
}

#[tokio::test]
async fn transport_abort_cancels_call() {
    let (tx, body) = body_channel();
    tx.send(wire(&[1, 1])).expect("body receiver alive");
    tx.abort();

    let exec = counter_executor(accumulate);
    let (mut sink, rx) = response_channel();
    let ctx = CallContext::new(ACCUMULATE);
    let status = exec.run(body, &mut sink, ctx.clone()).await;
    drop(sink);
    let response = rx.collect().await;

    assert!(ctx.is_cancelled());
    assert_eq!(status.code(), StatusCode::Cancelled);
    assert!(response.data.is_empty());
    assert_eq!(
        grpc_status(&response),
        (
            "1".to_string(),
            Some("Call canceled by the client.".to_string())
        )
    );
}

#[tokio::test]
async fn explicit_status_fault_with_metadata() {
    async fn reject_negative(
        mut requests: MessageReader<CounterRequest>,
        _ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        while let Some(message) = requests.next_message().await? {
            if message.count < 0 {
                return Err(HandlerError::from(
                    Status::invalid_argument("negative count")
                        .with_metadata("x-offending-value", message.count.to_string()),
                ));
            }
        }
        Ok(None)
    }

    let exec = counter_executor(reject_negative);
    let (status, response) = call(&exec, wire(&[1, -4, 2])).await;

    assert_eq!(status.code(), StatusCode::InvalidArgument);
    let trailers = response.trailers.expect("trailers should be sent");
    assert_eq!(trailers.get("grpc-status"), Some("3"));
    assert_eq!(trailers.get("grpc-message"), Some("negative count"));
    assert_eq!(trailers.get("x-offending-value"), Some("-4"));
}

#[tokio::test]
async fn detailed_errors_toggle_controls_fault_text() {
    async fn fail(
        _requests: MessageReader<CounterRequest>,
        _ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        Err(HandlerError::other("ledger offline"))
    }

    let detailed = counter_executor(fail);
    let (_, response) = call(&detailed, wire(&[1])).await;
    assert_eq!(
        grpc_status(&response),
        ("2".to_string(), Some("ledger offline".to_string()))
    );

    let opaque =
        counter_executor(fail).with_options(CallOptions::default().with_detailed_errors(false));
    let (_, response) = call(&opaque, wire(&[1])).await;
    assert_eq!(
        grpc_status(&response),
        (
            "2".to_string(),
            Some("Exception was thrown by handler.".to_string())
        )
    );
}

#[tokio::test]
async fn bad_request_payload_is_internal() {
    let mut body = BytesMut::new();
    encode_message(b"not json", &mut body).expect("frame should encode");

    let exec = counter_executor(accumulate);
    let (status, response) = call(&exec, body.to_vec()).await;

    assert_eq!(status.code(), StatusCode::Internal);
    assert_eq!(
        grpc_status(&response).1.as_deref(),
        Some("Failed to deserialize request message.")
    );
}

#[tokio::test]
async fn compressed_frame_is_rejected() {
    let body = vec![0x01, 0x00, 0x00, 0x00, 0x02, b'{', b'}'];

    let exec = counter_executor(accumulate);
    let (status, _) = call(&exec, body).await;

    assert_eq!(status.code(), StatusCode::Internal);
}

#[tokio::test]
async fn response_body_precedes_trailers() {
    let exec = counter_executor(accumulate);
    let (mut sink, mut rx) = response_channel();
    exec.run(
        std::io::Cursor::new(wire(&[5])),
        &mut sink,
        CallContext::new(ACCUMULATE),
    )
    .await;
    drop(sink);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ResponseEvent::Data(_)));
    assert!(matches!(events[1], ResponseEvent::Trailers(_)));
}

#[tokio::test]
async fn handler_is_invoked_once_per_call() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let exec = counter_executor(
        move |mut requests: MessageReader<CounterRequest>, _ctx: CallContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let mut n = 0;
                while requests.advance().await? {
                    n += 1;
                }
                Ok::<_, HandlerError>(Some(CounterReply { count: n }))
            }
        },
    );

    for _ in 0..3 {
        let (status, _) = call(&exec, wire(&[1, 2])).await;
        assert_eq!(status.code(), StatusCode::Ok);
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn registry_dispatches_to_registered_methods() {
    async fn max(
        mut requests: MessageReader<CounterRequest>,
        _ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        let mut best = i32::MIN;
        while let Some(message) = requests.next_message().await? {
            best = best.max(message.count);
        }
        Ok(Some(CounterReply { count: best }))
    }

    let mut registry = MethodRegistry::new();
    registry
        .register(counter_executor(accumulate))
        .expect("first registration")
        .register(ClientStreamingExecutor::new(
            "/count.Counter/MaxCount",
            max,
            JsonMarshaller::<CounterRequest>::new(),
            JsonMarshaller::<CounterReply>::new(),
        ))
        .expect("second registration");

    for (path, expected) in [(ACCUMULATE, 9), ("/count.Counter/MaxCount", 5)] {
        let (mut sink, rx) = response_channel();
        let body: RequestBody = Box::new(std::io::Cursor::new(wire(&[3, 5, 1])));
        let status = registry
            .dispatch(path, body, &mut sink, CallContext::new(path))
            .await;
        drop(sink);

        assert_eq!(status.code(), StatusCode::Ok, "{path}");
        assert_eq!(reply(&rx.collect().await.data), CounterReply { count: expected });
    }

    let (mut sink, rx) = response_channel();
    let body: RequestBody = Box::new(std::io::Cursor::new(Vec::new()));
    let status = registry
        .dispatch(
            "/count.Counter/Missing",
            body,
            &mut sink,
            CallContext::new("/count.Counter/Missing"),
        )
        .await;
    drop(sink);
    assert_eq!(status.code(), StatusCode::Unimplemented);
    assert_eq!(
        grpc_status(&rx.collect().await),
        ("12".to_string(), Some("Method is unimplemented.".to_string()))
    );
}

#[tokio::test]
async fn self_cancel_while_client_keeps_sending() {
    async fn stop_at_three(
        mut requests: MessageReader<CounterRequest>,
        ctx: CallContext,
    ) -> HandlerResult<CounterReply> {
        let mut total = 0;
        while let Ok(true) = requests.advance().await {
            total += requests.current()?.count;
            if total >= 3 {
                ctx.cancel();
            }
        }
        Ok(Some(CounterReply { count: total }))
    }

    let (tx, body) = body_channel();
    let client = tokio::spawn(async move {
        // Never finishes the body; stops once the server drops it.
        while tx.send(wire(&[1])).is_ok() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let exec = counter_executor(stop_at_three);
    let (mut sink, rx) = response_channel();
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        exec.run(body, &mut sink, CallContext::new(ACCUMULATE)),
    )
    .await
    .expect("call should complete while the body is still open");
    drop(sink);

    assert_eq!(status.code(), StatusCode::Ok);
    assert_eq!(reply(&rx.collect().await.data), CounterReply { count: 3 });
    client.await.expect("client task should stop");
}

#[tokio::test]
async fn huge_declared_length_is_incomplete_message() {
    let mut body = wire(&[1]);
    body.extend_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xF0]);

    let exec = counter_executor(accumulate);
    let (status, response) = call(&exec, body).await;

    assert_eq!(status.code(), StatusCode::Internal);
    assert_eq!(
        grpc_status(&response),
        ("13".to_string(), Some("Incomplete message.".to_string()))
    );
}
