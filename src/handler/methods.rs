//! Per-node HTTP method handler table.
//!
//! A small linear-scan list keyed by upper-cased method token, with a
//! separate not-allowed slot selected by the `"!"` token. An `OPTIONS`
//! response is synthesized from the registered methods when no explicit
//! `OPTIONS` handler is set.

use crate::error::RouterError;
use crate::handler::{BoxHandler, Middleware};
use std::fmt;
use std::sync::Arc;

pub(crate) const NOT_ALLOWED_TOKEN: &str = "!";
pub(crate) const ALL_METHODS_TOKEN: &str = "*";

/// A parsed methods string: comma and/or space separated tokens, each
/// upper-cased. The `"!"` and `"*"` tokens stand alone; mixing them
/// with method tokens is an error.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MethodTokens {
    NotAllowed,
    All,
    Methods(Vec<String>),
}

pub(crate) fn parse_method_tokens(methods: &str) -> Result<MethodTokens, RouterError> {
    let tokens: Vec<&str> = methods
        .split([',', ' '])
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(RouterError::NoMethod);
    }

    if tokens.len() == 1 {
        return Ok(match tokens[0] {
            NOT_ALLOWED_TOKEN => MethodTokens::NotAllowed,
            ALL_METHODS_TOKEN => MethodTokens::All,
            method => MethodTokens::Methods(vec![method.to_uppercase()]),
        });
    }

    if tokens
        .iter()
        .any(|t| *t == NOT_ALLOWED_TOKEN || *t == ALL_METHODS_TOKEN)
    {
        return Err(RouterError::NoMethod);
    }

    Ok(MethodTokens::Methods(
        tokens.iter().map(|t| t.to_uppercase()).collect(),
    ))
}

#[derive(Default, Clone)]
pub(crate) struct MethodHandlers {
    entries: Vec<(Box<str>, BoxHandler)>,
    not_allowed: Option<BoxHandler>,
}

impl fmt::Debug for MethodHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandlers")
            .field(
                "methods",
                &self.entries.iter().map(|(m, _)| &**m).collect::<Vec<_>>(),
            )
            .field("not_allowed", &self.not_allowed.is_some())
            .finish()
    }
}

impl MethodHandlers {
    pub(crate) fn new() -> MethodHandlers {
        MethodHandlers::default()
    }

    /// No method handler is registered. A node in this state is dormant.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn has_not_allowed(&self) -> bool {
        self.not_allowed.is_some()
    }

    /// Registers `handler` for each token in `methods`. The single
    /// token `"!"` selects the not-allowed slot; `"*"` is only valid
    /// for wrapping.
    pub(crate) fn set_for(&mut self, methods: &str, handler: BoxHandler) -> Result<(), RouterError> {
        match parse_method_tokens(methods)? {
            MethodTokens::NotAllowed => {
                self.not_allowed = Some(handler);
                Ok(())
            }
            MethodTokens::All => Err(RouterError::NoMethod),
            MethodTokens::Methods(tokens) => {
                for method in tokens {
                    self.set(&method, handler.clone());
                }
                Ok(())
            }
        }
    }

    fn set(&mut self, method: &str, handler: BoxHandler) {
        if let Some(entry) = self.entries.iter_mut().find(|(m, _)| &**m == method) {
            entry.1 = handler;
        } else {
            self.entries.push((method.into(), handler));
        }
    }

    pub(crate) fn get(&self, method: &str) -> Option<&BoxHandler> {
        if method == NOT_ALLOWED_TOKEN {
            return self.not_allowed.as_ref();
        }
        self.entries
            .iter()
            .find(|(m, _)| &**m == method)
            .map(|(_, h)| h)
    }

    pub(crate) fn not_allowed(&self) -> Option<&BoxHandler> {
        self.not_allowed.as_ref()
    }

    /// Wraps the handlers selected by `methods` with the given
    /// middleware, in listed order.
    pub(crate) fn wrap(
        &mut self,
        methods: &str,
        middleware: &[Arc<dyn Middleware>],
    ) -> Result<(), RouterError> {
        if middleware.is_empty() {
            return Err(RouterError::NoMiddleware);
        }

        match parse_method_tokens(methods)? {
            MethodTokens::NotAllowed => match self.not_allowed.take() {
                Some(handler) => {
                    self.not_allowed = Some(crate::handler::wrap_all(handler, middleware));
                    Ok(())
                }
                None => Err(RouterError::NoHandlerExists(NOT_ALLOWED_TOKEN.to_string())),
            },
            MethodTokens::All => {
                if self.entries.is_empty() {
                    return Err(RouterError::NoHandlerExists(ALL_METHODS_TOKEN.to_string()));
                }
                for entry in &mut self.entries {
                    let handler = entry.1.clone();
                    entry.1 = crate::handler::wrap_all(handler, middleware);
                }
                Ok(())
            }
            MethodTokens::Methods(tokens) => {
                for method in tokens {
                    let Some(entry) = self.entries.iter_mut().find(|(m, _)| **m == *method)
                    else {
                        return Err(RouterError::NoHandlerExists(method));
                    };
                    let handler = entry.1.clone();
                    entry.1 = crate::handler::wrap_all(handler, middleware);
                }
                Ok(())
            }
        }
    }

    /// The registered methods plus `OPTIONS`, sorted.
    pub(crate) fn allowed_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.entries.iter().map(|(m, _)| m.to_string()).collect();
        if !methods.iter().any(|m| m == "OPTIONS") {
            methods.push("OPTIONS".to_string());
        }
        methods.sort();
        methods
    }

    pub(crate) fn allow_header(&self) -> String {
        self.allowed_methods().join(", ")
    }

    pub(crate) fn compile(self) -> CompiledMethodHandlers {
        let allow: Arc<str> = Arc::from(self.allow_header().as_str());
        CompiledMethodHandlers {
            entries: self.entries,
            not_allowed: self.not_allowed,
            allow,
        }
    }
}

/// A handler answering `OPTIONS` with the node's `Allow` set, used
/// when no explicit `OPTIONS` handler is registered.
pub(crate) fn auto_options_handler(allow: Arc<str>) -> BoxHandler {
    Arc::new(move |mut ctx: crate::dispatch::RequestContext| {
        let allow = allow.clone();
        Box::pin(async move {
            ctx.set_response(crate::response::auto_options_response(&allow));
            (ctx, true)
        }) as crate::handler::HandlerFuture
    })
}

/// The frozen form served at request time, with the `Allow` header
/// value precomputed.
pub(crate) struct CompiledMethodHandlers {
    entries: Vec<(Box<str>, BoxHandler)>,
    not_allowed: Option<BoxHandler>,
    allow: Arc<str>,
}

impl CompiledMethodHandlers {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, method: &str) -> Option<&BoxHandler> {
        self.entries
            .iter()
            .find(|(m, _)| &**m == method)
            .map(|(_, h)| h)
    }

    pub(crate) fn not_allowed(&self) -> Option<&BoxHandler> {
        self.not_allowed.as_ref()
    }

    pub(crate) fn allow(&self) -> &Arc<str> {
        &self.allow
    }
}
