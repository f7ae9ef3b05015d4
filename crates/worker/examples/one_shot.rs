//! One-shot example - run a single remove request and print the response

use worker::{Term, WorkerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let dispatcher = WorkerConfig::default().build_dispatcher()?;

    let request = Term::tuple([
        Term::atom("remove"),
        Term::binary(r#"<ul><li>keep</li><li class="ad">drop</li></ul>"#),
        Term::binary(".ad"),
        Term::atom("body_children"),
    ]);
    println!("Request:  {}", serde_json::to_string(&request)?);

    match dispatcher.handle(request) {
        Some(response) => {
            println!("Response: {}", serde_json::to_string(&response)?);
            if let Term::Tuple(items) = &response {
                if let Some(Term::Binary(markup)) = items.get(1) {
                    println!("Markup:   {}", String::from_utf8_lossy(markup));
                }
            }
        }
        None => println!("No response (unrecognized request)"),
    }

    Ok(())
}
