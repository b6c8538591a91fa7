//! # Hook Planning
//!
//! Resolves the fixed set of functions the interception layer attaches to
//! before capture starts.
//!
//! | role                      | module      | name                                                      |
//! |---------------------------|-------------|-----------------------------------------------------------|
//! | XPC receive               | libxpc      | `_xpc_connection_call_event_handler`                      |
//! | XPC send                  | libxpc      | `xpc_connection_send_message` (+ `_with_reply`, `_with_reply_sync`) |
//! | exported-object call-out  | Foundation  | `__NSXPCCONNECTION_IS_CALLING_OUT_TO_EXPORTED_OBJECT__`   |
//! | exported-object stubs     | Foundation  | `__NSXPCCONNECTION_IS_CALLING_OUT_TO_EXPORTED_OBJECT_S*`  |
//! | proxy simple send         | Foundation  | `_NSXPCDistantObjectSimpleMessageSend*`                   |
//!
//! Every hook resolves on its own. A hook that cannot be resolved is recorded
//! as a failure and the rest of the plan stands.

use std::fmt;

use tracing::{debug, info, warn};

use crate::capture::proxy::{simple_send_arity, SIMPLE_SEND_PREFIX};
use crate::config::ScopeConfig;
use crate::error::ScopeError;
use crate::symbols::SymbolResolver;
use crate::types::{Direction, ResolvedSymbol};

/// What an attached hook observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookRole
{
    /// Dispatch of an incoming message to a connection's event handler.
    XpcReceive,
    /// One of the `xpc_connection_send_message*` calls.
    XpcSend,
    /// NSXPC invoking a method on an exported object.
    ExportedObjectCallOut,
    /// Specialised call-out stubs (one per argument shape).
    ExportedObjectStub,
    /// NSXPC proxy sending a message; carries the stub's argument count.
    ProxySimpleSend
    {
        arity: usize,
    },
}

impl HookRole
{
    /// Direction of the traffic this hook sees.
    pub fn direction(self) -> Direction
    {
        match self {
            HookRole::XpcReceive | HookRole::ExportedObjectCallOut | HookRole::ExportedObjectStub => Direction::Inbound,
            HookRole::XpcSend | HookRole::ProxySimpleSend { .. } => Direction::Outbound,
        }
    }
}

impl fmt::Display for HookRole
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            HookRole::XpcReceive => write!(f, "xpc-receive"),
            HookRole::XpcSend => write!(f, "xpc-send"),
            HookRole::ExportedObjectCallOut => write!(f, "nsxpc-callout"),
            HookRole::ExportedObjectStub => write!(f, "nsxpc-callout-stub"),
            HookRole::ProxySimpleSend { arity } => write!(f, "nsxpc-send/{arity}"),
        }
    }
}

/// How a hook's name is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup
{
    Exact,
    Glob,
}

/// One entry of the hook list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec
{
    /// Role of every point this spec resolves to. For the simple-send glob
    /// the arity is filled in per match.
    pub role: HookRole,
    pub module: String,
    /// C-level name or pattern.
    pub name: String,
    pub lookup: Lookup,
}

impl HookSpec
{
    fn new(role: HookRole, module: &str, name: impl Into<String>, lookup: Lookup) -> Self
    {
        Self {
            role,
            module: module.to_string(),
            name: name.into(),
            lookup,
        }
    }
}

/// A resolved hook address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPoint
{
    pub role: HookRole,
    pub module: String,
    pub symbol: ResolvedSymbol,
}

/// A hook that could not be resolved.
#[derive(Debug)]
pub struct HookFailure
{
    pub spec: HookSpec,
    pub error: ScopeError,
}

/// Resolved hooks plus per-hook failures.
#[derive(Debug, Default)]
pub struct HookPlan
{
    points: Vec<HookPoint>,
    failures: Vec<HookFailure>,
}

impl HookPlan
{
    /// The hook list for the configured modules.
    pub fn specs(config: &ScopeConfig) -> Vec<HookSpec>
    {
        let xpc = config.messaging_module.as_str();
        let foundation = config.proxy_module.as_str();

        let mut specs = vec![HookSpec::new(
            HookRole::XpcReceive,
            xpc,
            "_xpc_connection_call_event_handler",
            Lookup::Exact,
        )];
        for suffix in ["", "_with_reply", "_with_reply_sync"] {
            specs.push(HookSpec::new(
                HookRole::XpcSend,
                xpc,
                format!("xpc_connection_send_message{suffix}"),
                Lookup::Exact,
            ));
        }
        specs.push(HookSpec::new(
            HookRole::ExportedObjectCallOut,
            foundation,
            "__NSXPCCONNECTION_IS_CALLING_OUT_TO_EXPORTED_OBJECT__",
            Lookup::Exact,
        ));
        specs.push(HookSpec::new(
            HookRole::ExportedObjectStub,
            foundation,
            "__NSXPCCONNECTION_IS_CALLING_OUT_TO_EXPORTED_OBJECT_S*",
            Lookup::Glob,
        ));
        specs.push(HookSpec::new(
            HookRole::ProxySimpleSend { arity: 0 },
            foundation,
            format!("{SIMPLE_SEND_PREFIX}*"),
            Lookup::Glob,
        ));
        specs
    }

    /// Resolve every hook in [`HookPlan::specs`].
    pub fn resolve(resolver: &SymbolResolver, config: &ScopeConfig) -> Self
    {
        let mut plan = Self::default();
        for spec in Self::specs(config) {
            plan.resolve_spec(resolver, spec);
        }

        info!(resolved = plan.points.len(), failed = plan.failures.len(), "hook plan resolved");
        plan
    }

    fn resolve_spec(&mut self, resolver: &SymbolResolver, spec: HookSpec)
    {
        match spec.lookup {
            Lookup::Exact => match resolver.find_exact(&spec.module, &spec.name) {
                Ok(symbol) => self.push(spec.role, &spec.module, symbol),
                Err(error) => self.fail(spec, error),
            },
            Lookup::Glob => match resolver.find_glob(&spec.module, &spec.name) {
                Ok(symbols) if symbols.is_empty() => {
                    let error = ScopeError::SymbolNotFound {
                        module: spec.module.clone(),
                        symbol: spec.name.clone(),
                    };
                    self.fail(spec, error);
                }
                Ok(symbols) => {
                    for symbol in symbols {
                        let role = match spec.role {
                            HookRole::ProxySimpleSend { .. } => match simple_send_arity(&symbol.name) {
                                Some(arity) => HookRole::ProxySimpleSend { arity },
                                None => {
                                    debug!(name = %symbol.name, "simple send without arity suffix, skipping");
                                    continue;
                                }
                            },
                            role => role,
                        };
                        self.push(role, &spec.module, symbol);
                    }
                }
                Err(error) => self.fail(spec, error),
            },
        }
    }

    fn push(&mut self, role: HookRole, module: &str, symbol: ResolvedSymbol)
    {
        debug!(%role, %symbol, "hook resolved");
        self.points.push(HookPoint {
            role,
            module: module.to_string(),
            symbol,
        });
    }

    fn fail(&mut self, spec: HookSpec, error: ScopeError)
    {
        warn!(module = %spec.module, name = %spec.name, error = %error, "hook unavailable");
        self.failures.push(HookFailure { spec, error });
    }

    pub fn points(&self) -> &[HookPoint]
    {
        &self.points
    }

    pub fn failures(&self) -> &[HookFailure]
    {
        &self.failures
    }

    /// Points with the given role.
    pub fn points_for(&self, role: HookRole) -> impl Iterator<Item = &HookPoint>
    {
        self.points.iter().filter(move |point| point.role == role)
    }

    /// Whether every hook resolved.
    pub fn is_complete(&self) -> bool
    {
        self.failures.is_empty()
    }
}

impl fmt::Display for HookPlan
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for point in &self.points {
            writeln!(f, "{:<20} {:<14} {}", point.role.to_string(), point.module, point.symbol)?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "{:<20} {:<14} {} ({})",
                failure.spec.role.to_string(),
                failure.spec.module,
                failure.spec.name,
                failure.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_specs_cover_every_entry_point()
    {
        let specs = HookPlan::specs(&ScopeConfig::default());
        assert_eq!(specs.len(), 7);
        assert_eq!(specs[0].name, "_xpc_connection_call_event_handler");
        assert_eq!(specs.iter().filter(|spec| spec.role == HookRole::XpcSend).count(), 3);
        assert!(specs
            .iter()
            .any(|spec| spec.name == "_NSXPCDistantObjectSimpleMessageSend*" && spec.lookup == Lookup::Glob));
        assert!(specs.iter().filter(|spec| spec.module == "Foundation").count() == 3);
    }

    #[test]
    fn test_role_direction()
    {
        assert_eq!(HookRole::XpcReceive.direction(), Direction::Inbound);
        assert_eq!(HookRole::ProxySimpleSend { arity: 3 }.direction(), Direction::Outbound);
        assert_eq!(HookRole::ProxySimpleSend { arity: 3 }.to_string(), "nsxpc-send/3");
    }
}
