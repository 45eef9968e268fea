//! GET/SET command handler acceptance tests.
//!
//! Handlers are driven the way a host framework dispatches requests: an
//! argument list with the verb first and an output slot for the reply.

use hostcore_kv::{
    CommandHandler, CommandStatus, GetCommandHandler, Reply, SetCommandHandler, ShardedStore,
};
use std::collections::HashMap;
use std::thread;

/// Verb-to-handler routing as a host framework would register it.
struct Dispatcher<'a> {
    handlers: HashMap<&'static str, Box<dyn CommandHandler + 'a>>,
}

impl<'a> Dispatcher<'a> {
    fn new(store: &'a ShardedStore) -> Self {
        let mut dispatcher = Self {
            handlers: HashMap::new(),
        };
        dispatcher.register(Box::new(GetCommandHandler::new(store)));
        dispatcher.register(Box::new(SetCommandHandler::new(store)));
        dispatcher
    }

    fn register(&mut self, handler: Box<dyn CommandHandler + 'a>) {
        self.handlers.insert(handler.name(), handler);
    }

    fn dispatch(&self, args: &[&str]) -> (CommandStatus, Reply) {
        let verb = args[0].to_ascii_lowercase();
        let mut output = Reply::default();
        let status = self.handlers[verb.as_str()].run(args, &mut output);
        (status, output)
    }
}

#[test]
fn test_set_get_end_to_end() {
    let store = ShardedStore::new();
    let server = Dispatcher::new(&store);

    assert_eq!(
        server.dispatch(&["SET", "foo", "bar"]),
        (CommandStatus::Ok, Reply::Status("OK".into()))
    );
    assert_eq!(
        server.dispatch(&["GET", "foo"]),
        (CommandStatus::Ok, Reply::Bulk("bar".into()))
    );
    assert_eq!(
        server.dispatch(&["GET", "missing"]),
        (CommandStatus::Ok, Reply::Nil)
    );
}

#[test]
fn test_wrong_number_of_arguments() {
    let store = ShardedStore::new();
    let server = Dispatcher::new(&store);

    assert_eq!(
        server.dispatch(&["GET"]),
        (
            CommandStatus::Ok,
            Reply::Error("ERR wrong number of arguments for 'get' command".into())
        )
    );
    assert_eq!(
        server.dispatch(&["SET", "foo"]),
        (
            CommandStatus::Ok,
            Reply::Error("ERR wrong number of arguments for 'set' command".into())
        )
    );
    assert!(store.is_empty());
}

#[test]
fn test_handlers_share_store_across_threads() {
    let store = ShardedStore::new();
    let server = Dispatcher::new(&store);

    thread::scope(|scope| {
        for t in 0..4 {
            let server = &server;
            scope.spawn(move || {
                for i in 0..250 {
                    let key = format!("t{t}:{i}");
                    let (status, _) = server.dispatch(&["SET", key.as_str(), "v"]);
                    assert_eq!(status, CommandStatus::Ok);
                }
            });
        }
    });

    assert_eq!(store.len(), 1_000);
    assert_eq!(server.dispatch(&["GET", "t2:100"]).1.as_bulk(), Some("v"));
}
