use std::collections::VecDeque;
use std::io::Read;

use chain_console::{ConsoleError, Phase, Session};
use chain_core::{
    DumpType, Engine, EngineArrays, EngineStreams, SArray, SamplerInfo, StateDump,
};

/// One scripted reply: return value, error text, informational text.
type Reply = (bool, &'static str, &'static str);

#[derive(Debug, Default)]
struct ScriptedEngine {
    replies: VecDeque<Reply>,
    seen_streams: Vec<EngineStreams>,
}

impl ScriptedEngine {
    fn new(replies: &[Reply]) -> Self {
        Self {
            replies: replies.iter().copied().collect(),
            seen_streams: Vec::new(),
        }
    }

    fn reply(&mut self, io: &mut EngineStreams) -> bool {
        self.seen_streams.push(io.clone());
        let (returned, err, out) = self.replies.pop_front().unwrap_or((true, "", ""));
        io.err.push_str(err);
        io.out.push_str(out);
        returned
    }
}

impl Engine for ScriptedEngine {
    fn check_model(&mut self, model: &mut dyn Read, io: &mut EngineStreams) -> bool {
        let mut text = String::new();
        model.read_to_string(&mut text).unwrap();
        self.reply(io)
    }

    fn compile(&mut self, _: &EngineArrays, _: usize, _: bool, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn set_parameters(&mut self, _: &EngineArrays, _: usize, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn set_rng_name(&mut self, _: &str, _: usize, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn initialize(&mut self, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn update(&mut self, _: u64, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn set_monitor(&mut self, _: &str, _: u32, _: &str, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn clear_monitor(&mut self, _: &str, _: &str, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn dump_state(
        &mut self,
        out: &mut StateDump,
        _: DumpType,
        _: usize,
        io: &mut EngineStreams,
    ) -> bool {
        out.values.insert(
            "theta".to_string(),
            SArray::from_parts(vec![3, 1], vec![1.0, 2.0, 3.0]).unwrap(),
        );
        self.reply(io)
    }

    fn dump_monitors(
        &mut self,
        out: &mut EngineArrays,
        _: &str,
        _: bool,
        io: &mut EngineStreams,
    ) -> bool {
        out.insert(
            "theta".to_string(),
            SArray::from_parts(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        self.reply(io)
    }

    fn dump_samplers(&mut self, _: &mut Vec<SamplerInfo>, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn adapt_off(&mut self, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }

    fn check_adaptation(&mut self, status: &mut bool, io: &mut EngineStreams) -> bool {
        *status = true;
        self.reply(io)
    }

    fn iteration(&self) -> u64 {
        0
    }

    fn variable_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn nchain(&self) -> usize {
        0
    }

    fn is_adapting(&self) -> bool {
        false
    }

    fn clear_model(&mut self, io: &mut EngineStreams) -> bool {
        self.reply(io)
    }
}

#[test]
fn false_return_without_text_fails_with_empty_payload() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[(false, "", "")]));
    let err = session.update(1).unwrap_err();
    assert!(matches!(err, ConsoleError::Protocol(_)));
    assert_eq!(err.info().message, "");
}

#[test]
fn error_text_fails_even_when_the_call_returned_true() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[(true, "node y is odd\n", "")]));
    let err = session.initialize().unwrap_err();
    assert_eq!(err.info().message, "node y is odd\n");
    assert_eq!(session.phase(), Phase::Uninitialized);
}

#[test]
fn clean_calls_succeed_and_keep_informational_text() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[(true, "", "adapting\n")]));
    session.update(5).unwrap();
    assert_eq!(session.last_info(), "adapting\n");
    assert_eq!(session.phase(), Phase::Sampling);
}

#[test]
fn streams_are_empty_before_every_call() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[
        (false, "first failure\n", "noise\n"),
        (true, "", ""),
    ]));
    assert!(session.update(1).is_err());
    session.update(1).unwrap();
    assert!(session
        .engine()
        .seen_streams
        .iter()
        .all(|streams| streams.out.is_empty() && streams.err.is_empty()));
}

#[test]
fn outputs_are_discarded_on_failure_and_collapsed_on_success() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[(true, "bad chain\n", "")]));
    assert!(session.dump_state(DumpType::All, 0).is_err());

    let state = session.dump_state(DumpType::All, 0).unwrap();
    assert_eq!(state.values.get("theta").unwrap().shape(), &[3]);

    let samples = session.dump_monitors("trace", false).unwrap();
    let theta = samples.get("theta").unwrap();
    assert_eq!(theta.shape(), &[2, 3]);
    assert_eq!(theta[[1, 0]], 2.0);
    assert_eq!(theta[[0, 2]], 5.0);
}

#[test]
fn teardown_errors_are_swallowed() {
    let mut session = Session::with_engine(ScriptedEngine::new(&[
        (true, "", ""),
        (false, "cannot release\n", ""),
    ]));
    session.update(1).unwrap();
    session.clear_model();
    assert_eq!(session.phase(), Phase::Uninitialized);
}
