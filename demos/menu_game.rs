//! Menu and Game State Stack
//!
//! This example walks a small game front end through the stack operations.
//!
//! Key concepts:
//! - Pushing layers over each other (menu, game, pause overlay)
//! - Popping back to the layer underneath
//! - Flattening to a single state
//! - Progress reporting and lifecycle events
//!
//! Run with: cargo run --example menu_game

use async_trait::async_trait;
use statestack::core::{Direction, HookResult, ProgressSink, State, StateRef};
use statestack::engine::StackEvent;
use statestack::{StateStackBuilder, TransitionOptions};
use std::sync::Arc;
use std::time::Duration;

struct Screen {
    name: &'static str,
    loading_steps: u32,
}

#[async_trait]
impl State for Screen {
    fn name(&self) -> &str {
        self.name
    }

    async fn enter(
        &self,
        previous: Option<&StateRef>,
        progress: &dyn ProgressSink,
        direction: Direction,
    ) -> HookResult {
        let from = previous.map(|state| state.name()).unwrap_or("nothing");
        println!("  {} entered from {} ({:?})", self.name, from, direction);
        for step in 1..=self.loading_steps {
            tokio::time::sleep(Duration::from_millis(5)).await;
            progress.report(step as f32 / self.loading_steps as f32);
        }
        Ok(())
    }

    async fn exit(
        &self,
        next: Option<&StateRef>,
        progress: &dyn ProgressSink,
        _direction: Direction,
    ) -> HookResult {
        let to = next.map(|state| state.name()).unwrap_or("nothing");
        println!("  {} exited towards {}", self.name, to);
        progress.report(1.0);
        Ok(())
    }
}

fn screen(name: &'static str, loading_steps: u32) -> StateRef {
    Arc::new(Screen {
        name,
        loading_steps,
    })
}

fn print_stack(stack: &statestack::StateStack) {
    let names: Vec<String> = stack
        .stack()
        .iter()
        .map(|state| state.name().to_string())
        .collect();
    println!("Stack: {:?}\n", names);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Menu and Game State Stack ===\n");

    let stack = StateStackBuilder::new()
        .state(screen("Menu", 1))
        .state(screen("Game", 4))
        .state(screen("Pause", 1))
        .build()?;

    stack.subscribe(|event| match event {
        StackEvent::ProgressChanged { value, .. } => println!("    progress {:.0}%", value * 100.0),
        StackEvent::TransitionCompleted {
            operation, current, ..
        } => println!(
            "  {} completed, now on {}",
            operation,
            current.as_ref().map(|state| state.name()).unwrap_or("nothing")
        ),
        _ => {}
    });

    println!("Push Menu:");
    stack.push_named("Menu", TransitionOptions::new())?.await?;
    print_stack(&stack);

    println!("Push Game (with a loading budget):");
    stack
        .push_named(
            "Game",
            TransitionOptions::new().timeout(Duration::from_secs(1)),
        )?
        .await?;
    print_stack(&stack);

    println!("Push Pause overlay:");
    stack.push_named("Pause", TransitionOptions::new())?.await?;
    print_stack(&stack);

    println!("Pop back to the game:");
    let popped = stack.pop(TransitionOptions::new())?.await?;
    println!("  popped {}", popped.name());
    print_stack(&stack);

    println!("Flatten to Menu (quit to title):");
    stack.flatten_named("Menu", TransitionOptions::new())?.await?;
    print_stack(&stack);

    println!("History:");
    for record in stack.transition_history() {
        println!(
            "  {:<8} {:?} -> {:?}",
            record.operation.to_string(),
            record.previous,
            record.current
        );
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
