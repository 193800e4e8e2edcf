use chain_core::diagnostics::{reduce, DiagnosticChannel, EngineStreams};
use chain_core::ConsoleError;

#[test]
fn false_return_with_empty_error_fails_with_empty_payload() {
    let err = reduce(false, &EngineStreams::new()).unwrap_err();
    assert!(matches!(err, ConsoleError::Protocol(_)));
    assert_eq!(err.info().message, "");
}

#[test]
fn true_return_with_error_text_still_fails() {
    let mut streams = EngineStreams::new();
    streams.fail("Unknown variable mu");
    let err = reduce(true, &streams).unwrap_err();
    assert_eq!(err.info().message, "Unknown variable mu\n");
}

#[test]
fn true_return_with_only_info_text_succeeds() {
    let mut streams = EngineStreams::new();
    streams.note("NOTE: Stopping adaptation");
    assert!(reduce(true, &streams).is_ok());
}

#[test]
fn channel_resets_streams_before_each_call() {
    let mut channel = DiagnosticChannel::new();
    let failed = channel.invoke(|io| {
        io.note("compiling");
        io.fail("syntax error on line 1")
    });
    assert!(failed.is_err());
    assert_eq!(channel.error(), "syntax error on line 1\n");

    channel
        .invoke(|io| {
            assert!(io.out.is_empty());
            assert!(io.err.is_empty());
            io.note("ok");
            true
        })
        .unwrap();
    assert_eq!(channel.info(), "ok\n");
    assert!(channel.error().is_empty());
}
