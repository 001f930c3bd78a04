// Minimal example: build a small org tree, open it, check a department,
// search, and print the windowed rows.
use virtual_treelist::{
    Command, CommandOutput, EngineConfig, NodeId, OffloadChannel, OffloadEvent, RawRecord,
};

fn records() -> Vec<RawRecord> {
    vec![
        RawRecord::department(1, None, "Engineering"),
        RawRecord::person(2, Some(1), "Alice Smith", "Compiler Engineer")
            .with_contact("alice@example.com"),
        RawRecord::person(3, Some(1), "Bob Jones", "Platform Engineer"),
        RawRecord::department(4, None, "Sales"),
        RawRecord::department(5, Some(4), "EMEA"),
        RawRecord::person(6, Some(5), "Carol White", "Account Manager"),
    ]
}

fn main() {
    // Synchronous channel: same protocol as the worker, no thread needed
    // for a demo this small.
    let mut channel = OffloadChannel::inline(EngineConfig::default());

    channel.submit(Command::Build { records: records() });
    channel.submit(Command::ToggleExpand { id: NodeId(1) });
    channel.submit(Command::ToggleCheck {
        id: NodeId(1),
        checked: true,
    });
    // Searching "carol" expands Sales → EMEA so the match is reachable.
    channel.submit(Command::Search {
        query: "carol".to_owned(),
    });
    let _ = channel.submit_window(0, 400);

    for event in channel.poll() {
        match event {
            OffloadEvent::Done {
                output:
                    CommandOutput::WindowComputed {
                        generation: echoed,
                        window,
                        rows,
                    },
                ..
            } if channel.is_current_window(echoed) => {
                println!("content extent: {}px", window.total_extent);
                for row in rows {
                    let indent = "  ".repeat(usize::from(row.level));
                    let check = if row.checked {
                        "[x]"
                    } else if row.indeterminate {
                        "[-]"
                    } else {
                        "[ ]"
                    };
                    let mark = if row.matched { " <-- match" } else { "" };
                    println!("{:>4}px {check} {indent}{}{mark}", row.offset_px, row.name);
                }
            }
            OffloadEvent::Done { command, output } => {
                println!("{command:?} done: {output:?}");
            }
            OffloadEvent::Progress {
                command,
                processed,
                total,
            } => println!("{command:?} progress: {processed}/{total}"),
            OffloadEvent::Failed { command, error } => {
                eprintln!("{command:?} failed: {error}");
            }
        }
    }
}
