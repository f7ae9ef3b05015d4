//! Request Dispatcher - decodes tagged requests and encodes outcomes
//!
//! | Request                                  | Success              | Failure            |
//! |------------------------------------------|----------------------|--------------------|
//! | `{position, Html, Selector, Delimiter}`  | `{position, Result}` | `{error, Reason}`  |
//! | `{remove, Html, Selector, Scope}`        | `{remove, Result}`   | `{error, Reason}`  |
//! | `{find, Html, Selector, Delimiter}`      | `{find, Result}`     | `{error, Reason}`  |
//! | `{serialize, Html, Scope}`               | `{serialize, Result}`| `{error, Reason}`  |
//!
//! Any other shape gets no response at all. Callers only ever see an error
//! for a request that was recognized and then failed.

use dom::{DomError, Engine, Query, QueryService, GENERIC_REMOVE_REASON};
use uuid::Uuid;

use crate::events::{EventBus, WorkerEvent};
use crate::term::Term;

/// Decode a request term. `None` for every unrecognized shape.
///
/// Html, Selector and Delimiter must be binaries; Scope may be an atom or a
/// binary.
pub fn decode_request(term: Term) -> Option<Query> {
    let Term::Tuple(items) = term else {
        return None;
    };

    match items.len() {
        3 => {
            let [tag, html, scope]: [Term; 3] = items.try_into().ok()?;
            match (tag, html) {
                (Term::Atom(tag), Term::Binary(html)) if tag == "serialize" => {
                    Some(Query::Serialize {
                        html,
                        scope: scope.into_name()?,
                    })
                }
                _ => None,
            }
        }
        4 => {
            let [tag, html, selector, last]: [Term; 4] = items.try_into().ok()?;
            let (Term::Atom(tag), Term::Binary(html), Term::Binary(selector)) = (tag, html, selector)
            else {
                return None;
            };

            match (tag.as_str(), last) {
                ("position", Term::Binary(delimiter)) => Some(Query::Position {
                    html,
                    selector,
                    delimiter,
                }),
                ("find", Term::Binary(delimiter)) => Some(Query::Find {
                    html,
                    selector,
                    delimiter,
                }),
                ("remove", scope) => Some(Query::Remove {
                    html,
                    selector,
                    scope: scope.into_name()?,
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Routes decoded requests to the query pipelines
pub struct Dispatcher<E: Engine> {
    service: QueryService<E>,
    detailed_errors: bool,
    events: EventBus,
}

impl<E: Engine> Dispatcher<E> {
    pub fn new(service: QueryService<E>) -> Self {
        Self {
            service,
            detailed_errors: false,
            events: EventBus::new(),
        }
    }

    /// Replace the event bus with one retaining `capacity` unread events
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = EventBus::with_capacity(capacity);
        self
    }

    /// Report per-kind reasons for Remove failures instead of the generic one
    pub fn with_detailed_errors(mut self, detailed: bool) -> Self {
        self.detailed_errors = detailed;
        self
    }

    pub fn service(&self) -> &QueryService<E> {
        &self.service
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Decode `term`, publishing `RequestIgnored` when it is not a request
    pub fn accept(&self, term: Term) -> Option<Query> {
        let rendered = term.to_string();
        let query = decode_request(term);

        if query.is_none() {
            tracing::debug!("Ignoring unrecognized request {}", rendered);
            self.events.publish(WorkerEvent::RequestIgnored);
        }

        query
    }

    /// Run a decoded request and encode its outcome
    pub fn execute(&self, request_id: Uuid, query: &Query) -> Term {
        let kind = query.kind();
        let outcome = self.service.run(query);

        self.events.publish(WorkerEvent::RequestCompleted {
            request_id,
            kind: kind.to_string(),
            ok: outcome.is_ok(),
        });

        match outcome {
            Ok(result) => Term::tuple([Term::atom(kind), Term::binary(result)]),
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(request_id = %request_id, kind = kind, "Internal failure: {}", e);
                }
                Term::tuple([Term::atom("error"), Term::atom(self.reason(kind, &e))])
            }
        }
    }

    /// Decode and run in one step. `None` means no response must be sent.
    pub fn handle(&self, term: Term) -> Option<Term> {
        let query = self.accept(term)?;
        Some(self.execute(Uuid::now_v7(), &query))
    }

    fn reason(&self, kind: &str, error: &DomError) -> &'static str {
        if kind == "remove" && !self.detailed_errors {
            GENERIC_REMOVE_REASON
        } else {
            error.reason()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::ScraperEngine;

    fn dispatcher() -> Dispatcher<ScraperEngine> {
        Dispatcher::new(QueryService::default())
    }

    fn request(tag: &str, fields: &[&[u8]]) -> Term {
        let mut items = vec![Term::atom(tag)];
        items.extend(fields.iter().map(|f| Term::binary(f.to_vec())));
        Term::Tuple(items)
    }

    #[test]
    fn test_position_response() {
        let response = dispatcher().handle(request(
            "position",
            &[b"<div><span id='x'></span></div>", b"#x", b"/"],
        ));

        assert_eq!(
            response,
            Some(Term::tuple([Term::atom("position"), Term::binary("1/2/1/1")]))
        );
    }

    #[test]
    fn test_position_no_match_is_empty_binary() {
        let response = dispatcher().handle(request("position", &[b"<div></div>", b".missing", b"/"]));

        assert_eq!(
            response,
            Some(Term::tuple([Term::atom("position"), Term::binary("")]))
        );
    }

    #[test]
    fn test_remove_response() {
        let response = dispatcher().handle(request(
            "remove",
            &[b"<p>a</p><p class=\"x\">b</p>", b".x", b"body_children"],
        ));

        assert_eq!(
            response,
            Some(Term::tuple([Term::atom("remove"), Term::binary("<p>a</p>")]))
        );
    }

    #[test]
    fn test_remove_scope_as_atom() {
        let term = Term::tuple([
            Term::atom("remove"),
            Term::binary("<p>a</p><i>b</i>"),
            Term::binary("i"),
            Term::atom("body_children"),
        ]);

        assert_eq!(
            dispatcher().handle(term),
            Some(Term::tuple([Term::atom("remove"), Term::binary("<p>a</p>")]))
        );
    }

    #[test]
    fn test_remove_failures_use_generic_reason() {
        let dispatcher = dispatcher();
        let generic = Some(Term::tuple([
            Term::atom("error"),
            Term::atom(GENERIC_REMOVE_REASON),
        ]));

        let cases: [&[&[u8]]; 3] = [
            &[b"<p>a</p>", b".missing", b"document"],
            &[b"<p>a</p>", b"p[", b"document"],
            &[b"<p>a</p>", b"p", b"nowhere"],
        ];
        for fields in cases {
            assert_eq!(dispatcher.handle(request("remove", fields)), generic);
        }
    }

    #[test]
    fn test_detailed_reasons() {
        let dispatcher = dispatcher().with_detailed_errors(true);

        assert_eq!(
            dispatcher.handle(request("remove", &[b"<p>a</p>", b"p[", b"document"])),
            Some(Term::tuple([Term::atom("error"), Term::atom("Invalid selector")]))
        );
        assert_eq!(
            dispatcher.handle(request("remove", &[b"<p>a</p>", b"p", b"nowhere"])),
            Some(Term::tuple([Term::atom("error"), Term::atom("Invalid scope")]))
        );
        assert_eq!(
            dispatcher.handle(request("remove", &[b"<p>a</p>", b"i", b"document"])),
            Some(Term::tuple([
                Term::atom("error"),
                Term::atom(GENERIC_REMOVE_REASON)
            ]))
        );
    }

    #[test]
    fn test_find_and_serialize() {
        let dispatcher = dispatcher();

        assert_eq!(
            dispatcher.handle(request("find", &[b"<b>1</b><b>2</b>", b"b", b","])),
            Some(Term::tuple([Term::atom("find"), Term::binary("<b>1</b>,<b>2</b>")]))
        );
        assert_eq!(
            dispatcher.handle(request("serialize", &[b"<b>1</b>", b"body"])),
            Some(Term::tuple([
                Term::atom("serialize"),
                Term::binary("<body><b>1</b></body>")
            ]))
        );
    }

    #[test]
    fn test_unrecognized_shapes_get_no_response() {
        let dispatcher = dispatcher();

        let shapes = [
            request("replace", &[b"<p>", b"p", b"x"]),
            request("remove", &[b"<p>", b"p"]),
            request("position", &[b"<p>", b"p", b"/", b"extra"]),
            Term::tuple([
                Term::atom("position"),
                Term::atom("not-a-binary"),
                Term::binary("p"),
                Term::binary("/"),
            ]),
            Term::tuple([Term::binary("remove"), Term::binary("<p>"), Term::binary("p"), Term::binary("body")]),
            Term::atom("remove"),
            Term::tuple([]),
        ];

        for shape in shapes {
            assert_eq!(dispatcher.handle(shape), None);
        }
    }

    #[test]
    fn test_events_published() {
        let dispatcher = dispatcher();
        let mut rx = dispatcher.events().subscribe();

        dispatcher.handle(Term::atom("noise"));
        dispatcher.handle(request("position", &[b"<p>", b"p", b"/"]));

        assert_eq!(rx.try_recv().unwrap(), WorkerEvent::RequestIgnored);
        match rx.try_recv().unwrap() {
            WorkerEvent::RequestCompleted { kind, ok, .. } => {
                assert_eq!(kind, "position");
                assert!(ok);
            }
            other => panic!("Expected RequestCompleted, got {:?}", other),
        }
    }
}
