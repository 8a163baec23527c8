//! `forge run <module>` — drive a module's workflow to completion or
//! interruption, wiring the orchestrator to a real clock and a ctrl-c
//! cancellation source.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::llm::CancelSource;
use crate::orchestrator::Orchestrator;

pub async fn cmd_run(config: Config, module: &str) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let mut orchestrator = Orchestrator::new(config, clock)?;
    let mut session = orchestrator.load_or_create_session(module)?;
    let session_id = session.session_id.clone();

    let (cancel_source, cancel_token) = CancelSource::new();
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, finishing the current iteration before stopping");
            cancel_source.cancel();
        }
    };

    let run = orchestrator.run(&mut session, &cancel_token);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => report(&session_id, result),
        _ = ctrl_c => report(&session_id, run.await),
    }
}

fn report(session_id: &str, result: Result<crate::workflow::WorkflowStep>) -> Result<()> {
    match result {
        Ok(step) => {
            info!(session_id, step = ?step, "run finished");
            Ok(())
        }
        Err(e) => {
            error!(session_id, error = %e, "run failed");
            Err(e)
        }
    }
}
