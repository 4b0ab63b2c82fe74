//! Property-based tests for the state stack and its core types.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use statestack::core::{
    same_state, Direction, HookResult, ProgressSink, RingBuffer, ScopedProgress, State, StateRef,
};
use statestack::engine::{StackEvent, StateStack, TransitionOptions};
use std::sync::Arc;

struct Layer(&'static str);

#[async_trait]
impl State for Layer {
    fn name(&self) -> &str {
        self.0
    }
}

/// Enter hook that replays a fixed sequence of progress reports.
struct Reporter(Vec<f32>);

#[async_trait]
impl State for Reporter {
    fn name(&self) -> &str {
        "Reporter"
    }

    async fn enter(
        &self,
        _previous: Option<&StateRef>,
        progress: &dyn ProgressSink,
        _direction: Direction,
    ) -> HookResult {
        for value in &self.0 {
            progress.report(*value);
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Op {
    Push(usize),
    Pop,
}

prop_compose! {
    fn arbitrary_op()(push in any::<bool>(), index in 0..4usize) -> Op {
        if push { Op::Push(index) } else { Op::Pop }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

struct Recorder(Mutex<Vec<f32>>);

impl ProgressSink for Recorder {
    fn report(&self, value: f32) {
        self.0.lock().push(value);
    }
}

proptest! {
    #[test]
    fn stack_follows_lifo_model(ops in prop::collection::vec(arbitrary_op(), 0..24)) {
        let pool: Vec<StateRef> = vec![
            Arc::new(Layer("A")),
            Arc::new(Layer("B")),
            Arc::new(Layer("C")),
            Arc::new(Layer("D")),
        ];

        runtime().block_on(async {
            let stack = StateStack::new();
            let mut model: Vec<StateRef> = Vec::new();

            for op in &ops {
                match op {
                    Op::Push(index) => {
                        let state = &pool[*index];
                        stack.push(state, TransitionOptions::new()).unwrap().await.unwrap();
                        if !model.last().is_some_and(|top| same_state(top, state)) {
                            model.push(Arc::clone(state));
                        }
                    }
                    Op::Pop => {
                        let popped = stack.try_pop(TransitionOptions::new()).unwrap().await.unwrap();
                        let expected = model.pop();
                        match (popped, expected) {
                            (Some(popped), Some(expected)) => {
                                assert!(same_state(&popped, &expected));
                            }
                            (None, None) => {}
                            (popped, expected) => panic!(
                                "Popped {:?}, expected {:?}",
                                popped.map(|s| s.name().to_string()),
                                expected.map(|s| s.name().to_string())
                            ),
                        }
                    }
                }

                let actual = stack.stack();
                assert_eq!(actual.len(), model.len());
                assert!(actual.iter().zip(&model).all(|(a, b)| same_state(a, b)));
            }

            assert_eq!(stack.transition_history().len(), ops.len().min(64));
        });
    }

    #[test]
    fn reported_progress_is_monotonic(reports in prop::collection::vec(-0.5f32..1.5, 0..12)) {
        runtime().block_on(async {
            let stack = StateStack::new();
            let values = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&values);
            stack.subscribe(move |event| {
                if let StackEvent::ProgressChanged { value, .. } = event {
                    sink.lock().push(*value);
                }
            });

            let reporter: StateRef = Arc::new(Reporter(reports.clone()));
            stack.push(&reporter, TransitionOptions::new()).unwrap().await.unwrap();

            let values = values.lock().clone();
            assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(values.last().copied(), Some(1.0));
            assert_eq!(stack.progress(), 1.0);
        });
    }

    #[test]
    fn ring_buffer_keeps_newest_items(
        capacity in 1..16usize,
        items in prop::collection::vec(any::<u32>(), 0..64)
    ) {
        let mut buffer = RingBuffer::new(capacity);
        for item in &items {
            buffer.push(*item);
        }

        let kept = items.len().min(capacity);
        let expected: Vec<u32> = items[items.len() - kept..].to_vec();
        prop_assert_eq!(buffer.len(), kept);
        prop_assert_eq!(buffer.to_vec(), expected);
        prop_assert_eq!(buffer.newest().copied(), items.last().copied());
    }

    #[test]
    fn scoped_progress_stays_within_its_range(
        start in 0.0f32..=1.0,
        width in 0.0f32..=1.0,
        value in -2.0f32..2.0
    ) {
        let end = (start + width).min(1.0);
        let root = Recorder(Mutex::new(Vec::new()));
        let scope = ScopedProgress::range(&root, start, end);
        scope.report(value);

        let reported = root.0.lock()[0];
        prop_assert!(reported >= start - f32::EPSILON);
        prop_assert!(reported <= end + f32::EPSILON);
    }

    #[test]
    fn nested_scopes_compose(outer in 0.0f32..=0.5, inner in 0.0f32..=1.0) {
        let root = Recorder(Mutex::new(Vec::new()));
        let second_half = ScopedProgress::range(&root, 0.5, 1.0);
        let nested = second_half.child(outer, 0.5);
        nested.report(inner);

        let reported = root.0.lock()[0];
        let expected = 0.5 + (outer + inner * 0.5) * 0.5;
        prop_assert!((reported - expected).abs() < 1e-5);
    }
}
