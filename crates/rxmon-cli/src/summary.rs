//! Plain-text rendering of a materialised graph.

use std::fmt::{self, Write};

use rxmon_model::{ReactivityModel, UNKNOWN_NAME};

/// Writes one line per module followed by an indented line per call.
///
/// Calls whose module never arrived are listed under a placeholder heading.
pub fn render(model: &ReactivityModel, out: &mut impl Write) -> fmt::Result {
    for added in model.modules().drain_ready() {
        let module = added.value;
        writeln!(out, "{} ({})", module.assembly_name, module.path)?;
        for call in module.instrumented_calls(model).snapshot() {
            render_call(model, &call, out)?;
        }
    }

    let orphans: Vec<_> = model
        .instrumented_calls()
        .drain_ready()
        .into_iter()
        .filter(|added| model.module(added.value.module_id).is_none())
        .map(|added| added.value)
        .collect();
    if !orphans.is_empty() {
        writeln!(out, "{UNKNOWN_NAME}")?;
        for call in &orphans {
            render_call(model, call, out)?;
        }
    }
    Ok(())
}

fn render_call(
    model: &ReactivityModel,
    call: &rxmon_model::InstrumentedCall,
    out: &mut impl Write,
) -> fmt::Result {
    let observables = call.observable_instances(model).snapshot();
    let subscriptions: usize = observables
        .iter()
        .map(|obs| obs.subscriptions(model).len())
        .sum();
    writeln!(
        out,
        "  [{}] {}  observables={} subscriptions={}",
        call.id,
        call,
        observables.len(),
        subscriptions
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rxmon_types::{CallInstrumented, EventInfo, ModuleLoaded, ObservableCreated, ProfilerEvent};

    fn call(call_id: i32, module_id: u64) -> ProfilerEvent {
        ProfilerEvent::CallInstrumented(CallInstrumented {
            call_id,
            module_id,
            calling_type: "App.Orders".to_string(),
            calling_method: "Watch".to_string(),
            called_method: "Throttle".to_string(),
            instruction_offset: 8,
        })
    }

    #[test]
    fn modules_list_their_calls_and_orphans_are_grouped() {
        let model = ReactivityModel::new();
        model.ingest(ProfilerEvent::ModuleLoaded(ModuleLoaded {
            module_id: 1,
            path: "/app/App.dll".to_string(),
            assembly_name: "App".to_string(),
        }));
        model.ingest(call(3, 1));
        model.ingest(call(4, 2));
        model.ingest(ProfilerEvent::ObservableCreated(ObservableCreated {
            created: EventInfo::new(10, DateTime::<Utc>::UNIX_EPOCH, 1),
            instrumentation_point_id: 3,
        }));

        let mut out = String::new();
        render(&model, &mut out).expect("rendering into a string cannot fail");

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "App (/app/App.dll)",
                "  [3] App.Orders.Watch -> Throttle @8  observables=1 subscriptions=0",
                "[unknown]",
                "  [4] App.Orders.Watch -> Throttle @8  observables=0 subscriptions=0",
            ]
        );
    }
}
