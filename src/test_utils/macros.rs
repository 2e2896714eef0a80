/// Asserts that the next event on an [`EventStream`](crate::EventStream)
/// matches a pattern, with an optional body run against the bindings.
///
/// ```ignore
/// assert_event!(stream, ProviderEvent::Block(5));
/// assert_event!(stream, ProviderEvent::Block(n) => assert!(n > 4));
/// ```
///
/// # Panics
///
/// * The stream yields no event within the timeout (default 5 seconds).
/// * The event does not match the pattern.
#[macro_export]
macro_rules! assert_event {
    ($stream:expr, $pattern:pat) => {
        $crate::assert_event!($stream, $pattern => ())
    };
    ($stream:expr, $pattern:pat => $body:expr) => {{
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), $stream.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed");
        match event {
            $pattern => $body,
            other => panic!(
                "expected event matching {}, got: {other:?}",
                stringify!($pattern)
            ),
        }
    }};
}

/// Asserts that an [`EventStream`](crate::EventStream) stays quiet for the
/// given window (default 50 milliseconds).
#[macro_export]
macro_rules! assert_no_event {
    ($stream:expr) => {
        $crate::assert_no_event!($stream, millis = 50)
    };
    ($stream:expr, millis = $millis:expr) => {{
        match tokio::time::timeout(
            std::time::Duration::from_millis($millis),
            $stream.recv(),
        )
        .await
        {
            Err(_elapsed) => {}
            Ok(event) => panic!("expected no event, got: {event:?}"),
        }
    }};
}
