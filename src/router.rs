//! Request routing.
//!
//! A `Router` maps `(method, path)` pairs to handlers. Handlers come in two
//! shapes: plain synchronous callables, and asynchronous ones that take the
//! request and response by value and return the response from a boxed
//! future. Routes may carry ordered aspects that run around the handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::http::request::{Method, Request};
use crate::http::response::Response;

type SyncHandlerFn = dyn Fn(&Request, &mut Response) + Send + Sync;
type AsyncHandlerFn = dyn Fn(Request, Response) -> Pin<Box<dyn Future<Output = Response> + Send>>
    + Send
    + Sync;

/// A route handler: either a synchronous callable or one producing a
/// suspended computation.
pub enum Handler {
    Sync(Box<SyncHandlerFn>),
    Async(Box<AsyncHandlerFn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        Handler::Sync(Box::new(f))
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Handler::Async(Box::new(move |req, resp| Box::pin(f(req, resp))))
    }
}

/// An ordered interceptor around a handler. `before` returning false stops
/// the chain; whatever the aspect left in the response is finalized as-is.
pub trait Aspect: Send + Sync {
    fn before(&self, req: &mut Request, resp: &mut Response) -> bool {
        let _ = (req, resp);
        true
    }

    fn after(&self, resp: &mut Response) {
        let _ = resp;
    }
}

pub struct Route {
    pub handler: Handler,
    pub aspects: Vec<Arc<dyn Aspect>>,
}

/// Routing table. Registration happens during configuration; lookups at
/// request time only take the read side of the lock and clone the route
/// handle out, so the lock is never held across an await.
pub struct Router {
    routes: RwLock<HashMap<(Method, String), Arc<Route>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `handler` for `path` under every method in `methods`.
    /// A later registration for the same `(method, path)` replaces the
    /// earlier one.
    pub fn set_http_handler(
        &self,
        methods: &[Method],
        path: impl Into<String>,
        handler: Handler,
        aspects: Vec<Arc<dyn Aspect>>,
    ) {
        let path = path.into();
        let route = Arc::new(Route { handler, aspects });
        let mut routes = self.routes.write().unwrap();
        for method in methods {
            routes.insert((*method, path.clone()), Arc::clone(&route));
        }
    }

    pub fn route(&self, method: Method, path: &str) -> Option<Arc<Route>> {
        self.routes
            .read()
            .unwrap()
            .get(&(method, path.to_string()))
            .cloned()
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().unwrap().len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
