//! Call graph analysis for recursion and stack levels
//!
//! This module builds a call graph between user-defined functions and detects
//! strongly connected components (SCCs) to identify recursion cycles.
//!
//! # Usage
//!
//! ```ignore
//! let call_graph = CallGraph::build(&ctx_module);
//! let self_calls = call_graph.unconditional_self_calls();
//! ```
//!
//! # Primary Use Cases
//!
//! 1. **Fail-fast recursion check**: a function that calls itself on every
//!    path exceeds any stack depth, so lowering rejects it up front.
//!
//! 2. **Stack-level reachability**: the linker only emits a function at the
//!    levels it can actually be entered at. Roots start at level 0 and each
//!    call goes one level deeper, up to the configured maximum.
//!
//! # Implementation Details
//!
//! - **Algorithm**: Tarjan's SCC algorithm, O(V + E) time complexity
//! - **Library operations**: excluded from the graph (they never call back)
//! - **Branches and loops**: calls inside them are edges, but they never count
//!   as unconditional

use crate::ctx::{BinOp, CtxExpr, CtxModule, CtxStmnt, ExprKind};
use crate::smt::SmtModule;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A call graph representing which functions call which other functions.
#[derive(Debug, Clone)]
pub struct CallGraph {
    /// Map from function name to the set of functions it calls
    edges: HashMap<String, HashSet<String>>,
    /// All function names in the program
    functions: HashSet<String>,
    /// Calls made on every path through a function body
    unconditional: HashMap<String, HashSet<String>>,
    /// Strongly connected components with more than one member (mutual recursion)
    /// or single members that call themselves (direct recursion)
    recursive_sccs: Vec<HashSet<String>>,
}

impl CallGraph {
    /// Build a call graph from a contextual tree.
    ///
    /// The top-level script is not a node: nothing can call it.
    pub fn build(module: &CtxModule) -> Self {
        let functions: HashSet<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let mut edges = HashMap::new();
        let mut unconditional = HashMap::new();

        for func in &module.functions {
            let mut calls = HashSet::new();
            for stmt in &func.body {
                extract_calls_from_statement(stmt, &functions, &mut calls);
            }
            edges.insert(func.name.clone(), calls);
            unconditional.insert(
                func.name.clone(),
                unconditional_calls(&func.body, &functions),
            );
        }

        Self::with_edges(functions, edges, unconditional)
    }

    /// Build a call graph from a lowered module, script included.
    pub fn from_module(module: &SmtModule) -> Self {
        let functions: HashSet<String> = module.functions().map(|f| f.name().to_string()).collect();
        let mut edges: HashMap<String, HashSet<String>> = HashMap::new();

        for func in module.functions() {
            let callees = edges.entry(func.name().to_string()).or_default();
            for (_, fragment) in func.graph().iter() {
                for cmd in fragment.commands() {
                    let callee = cmd.callee().and_then(|id| module.func(id).ok());
                    if let Some(callee) = callee {
                        callees.insert(callee.name().to_string());
                    }
                }
            }
        }

        Self::with_edges(functions, edges, HashMap::new())
    }

    fn with_edges(
        functions: HashSet<String>,
        edges: HashMap<String, HashSet<String>>,
        unconditional: HashMap<String, HashSet<String>>,
    ) -> Self {
        let mut graph = CallGraph {
            edges,
            functions,
            unconditional,
            recursive_sccs: Vec::new(),
        };

        // Compute SCCs and identify recursive cycles
        graph.recursive_sccs = graph.find_sccs();

        graph
    }

    /// Check if a function is part of any recursive cycle (direct or mutual).
    #[cfg(test)]
    pub fn is_recursive(&self, func: &str) -> bool {
        self.recursive_sccs.iter().any(|scc| scc.contains(func))
    }

    /// Check if two functions are in the same recursive cycle.
    #[cfg(test)]
    pub fn are_mutually_recursive(&self, a: &str, b: &str) -> bool {
        self.recursive_sccs
            .iter()
            .any(|scc| scc.contains(a) && scc.contains(b))
    }

    /// Get all recursive cycles (SCCs with recursion).
    pub fn recursive_cycles(&self) -> &[HashSet<String>] {
        &self.recursive_sccs
    }

    /// Get the functions that a given function calls.
    pub fn callees(&self, func: &str) -> Option<&HashSet<String>> {
        self.edges.get(func)
    }

    /// Functions that call themselves on every path, sorted by name
    pub fn unconditional_self_calls(&self) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .unconditional
            .iter()
            .filter(|(name, calls)| calls.contains(name.as_str()))
            .map(|(name, _)| name.as_str())
            .collect();
        found.sort_unstable();
        found
    }

    /// Every stack level each function can be entered at.
    ///
    /// Roots are entered at level 0; a call made at level N enters the callee
    /// at N+1 as long as that does not exceed `max_depth`. Deeper calls hit the
    /// overflow handler instead and reach nothing.
    pub fn reachable_levels(
        &self,
        roots: &[String],
        max_depth: usize,
    ) -> HashMap<String, BTreeSet<usize>> {
        let mut levels: HashMap<String, BTreeSet<usize>> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        for root in roots {
            if levels.entry(root.clone()).or_default().insert(0) {
                queue.push_back((root.clone(), 0));
            }
        }

        while let Some((func, level)) = queue.pop_front() {
            if level + 1 > max_depth {
                continue;
            }
            let Some(callees) = self.callees(&func) else {
                continue;
            };
            for callee in callees {
                if levels.entry(callee.clone()).or_default().insert(level + 1) {
                    queue.push_back((callee.clone(), level + 1));
                }
            }
        }

        levels
    }

    /// Find strongly connected components using Tarjan's algorithm.
    ///
    /// Returns only SCCs that represent recursion:
    /// - Multi-function SCCs (mutual recursion)
    /// - Single-function SCCs where the function calls itself (direct recursion)
    fn find_sccs(&self) -> Vec<HashSet<String>> {
        let mut state = TarjanState::default();

        // Sorted so the SCC order is stable between runs
        let mut names: Vec<&String> = self.functions.iter().collect();
        names.sort();
        for name in names {
            if !state.indices.contains_key(name) {
                self.tarjan_visit(name, &mut state);
            }
        }

        state
            .sccs
            .into_iter()
            .filter(|scc| match scc.len() {
                0 => false,
                1 => scc
                    .iter()
                    .all(|name| self.callees(name).is_some_and(|c| c.contains(name))),
                _ => true,
            })
            .collect()
    }

    /// Tarjan's algorithm recursive visit.
    fn tarjan_visit(&self, func: &str, state: &mut TarjanState) {
        let index = state.counter;
        state.counter += 1;
        state.indices.insert(func.to_string(), index);
        state.lowlinks.insert(func.to_string(), index);
        state.stack.push(func.to_string());
        state.on_stack.insert(func.to_string());

        if let Some(callees) = self.callees(func) {
            for callee in callees {
                if !self.functions.contains(callee) {
                    continue;
                }
                let lowlink = if !state.indices.contains_key(callee) {
                    self.tarjan_visit(callee, state);
                    state.lowlinks.get(callee).copied()
                } else if state.on_stack.contains(callee) {
                    state.indices.get(callee).copied()
                } else {
                    None
                };
                if let (Some(lowlink), Some(current)) = (lowlink, state.lowlinks.get_mut(func)) {
                    *current = (*current).min(lowlink);
                }
            }
        }

        // If func is a root node, pop the SCC
        if state.lowlinks.get(func) == state.indices.get(func) {
            let mut scc = HashSet::new();
            while let Some(member) = state.stack.pop() {
                state.on_stack.remove(&member);
                let done = member == func;
                scc.insert(member);
                if done {
                    break;
                }
            }
            state.sccs.push(scc);
        }
    }
}

#[derive(Default)]
struct TarjanState {
    counter: usize,
    stack: Vec<String>,
    on_stack: HashSet<String>,
    indices: HashMap<String, usize>,
    lowlinks: HashMap<String, usize>,
    sccs: Vec<HashSet<String>>,
}

/// Extract function calls from a single statement, descending into every
/// branch and loop body.
fn extract_calls_from_statement(
    stmt: &CtxStmnt,
    known: &HashSet<String>,
    calls: &mut HashSet<String>,
) {
    match stmt {
        CtxStmnt::Assign { value, .. } => extract_calls_from_expr(value, known, calls),
        CtxStmnt::Expr { expr } => extract_calls_from_expr(expr, known, calls),
        CtxStmnt::Return { value } | CtxStmnt::VarDecl { value, .. } => {
            if let Some(value) = value {
                extract_calls_from_expr(value, known, calls);
            }
        }
        CtxStmnt::While { cond, body } => {
            extract_calls_from_expr(cond, known, calls);
            for s in body {
                extract_calls_from_statement(s, known, calls);
            }
        }
        CtxStmnt::If {
            branches,
            else_body,
        } => {
            for branch in branches {
                extract_calls_from_expr(&branch.cond, known, calls);
                for s in &branch.body {
                    extract_calls_from_statement(s, known, calls);
                }
            }
            for s in else_body.iter().flatten() {
                extract_calls_from_statement(s, known, calls);
            }
        }
        CtxStmnt::For {
            start, end, body, ..
        } => {
            extract_calls_from_expr(start, known, calls);
            extract_calls_from_expr(end, known, calls);
            for s in body {
                extract_calls_from_statement(s, known, calls);
            }
        }
        CtxStmnt::Block { body } => {
            for s in body {
                extract_calls_from_statement(s, known, calls);
            }
        }
    }
}

fn extract_calls_from_expr(expr: &CtxExpr, known: &HashSet<String>, calls: &mut HashSet<String>) {
    collect_expr_calls(expr, known, calls, false);
}

/// Calls an expression always makes. The right side of `??` only runs when
/// the left side is null, so it is left out.
fn extract_eager_calls(expr: &CtxExpr, known: &HashSet<String>, calls: &mut HashSet<String>) {
    collect_expr_calls(expr, known, calls, true);
}

fn collect_expr_calls(
    expr: &CtxExpr,
    known: &HashSet<String>,
    calls: &mut HashSet<String>,
    eager_only: bool,
) {
    match &expr.kind {
        ExprKind::Call {
            func,
            executor,
            args,
        } => {
            // Only track calls to user-defined functions
            if known.contains(func) {
                calls.insert(func.clone());
            }
            if let Some(executor) = executor {
                collect_expr_calls(executor, known, calls, eager_only);
            }
            for arg in args.iter().flatten() {
                collect_expr_calls(arg, known, calls, eager_only);
            }
        }
        ExprKind::Library {
            executor,
            args,
            extra,
            ..
        } => {
            if let Some(executor) = executor {
                collect_expr_calls(executor, known, calls, eager_only);
            }
            for arg in args.iter().chain(extra) {
                collect_expr_calls(arg, known, calls, eager_only);
            }
        }
        ExprKind::Chain { executor, links } => {
            collect_expr_calls(executor, known, calls, eager_only);
            for arg in links.iter().flat_map(|link| &link.args) {
                collect_expr_calls(arg, known, calls, eager_only);
            }
        }
        ExprKind::Binary { op, left, right } => {
            collect_expr_calls(left, known, calls, eager_only);
            if !(eager_only && *op == BinOp::NullCoalesce) {
                collect_expr_calls(right, known, calls, eager_only);
            }
        }
        ExprKind::Unary { operand, .. } => collect_expr_calls(operand, known, calls, eager_only),
        ExprKind::Int { .. }
        | ExprKind::Bool { .. }
        | ExprKind::Float { .. }
        | ExprKind::Str { .. }
        | ExprKind::Null
        | ExprKind::Var { .. }
        | ExprKind::This
        | ExprKind::World => {}
    }
}

/// Calls made on every path through `body`: everything evaluated before the
/// first top-level return, skipping branch and loop bodies. Loop headers and
/// the first condition of an if chain always run.
fn unconditional_calls(body: &[CtxStmnt], known: &HashSet<String>) -> HashSet<String> {
    let mut calls = HashSet::new();
    collect_unconditional(body, known, &mut calls);
    calls
}

/// Returns true once a return statement ends the straight-line path
fn collect_unconditional(
    body: &[CtxStmnt],
    known: &HashSet<String>,
    calls: &mut HashSet<String>,
) -> bool {
    for stmt in body {
        match stmt {
            CtxStmnt::Assign { value, .. } => extract_eager_calls(value, known, calls),
            CtxStmnt::Expr { expr } => extract_eager_calls(expr, known, calls),
            CtxStmnt::VarDecl { value, .. } => {
                if let Some(value) = value {
                    extract_eager_calls(value, known, calls);
                }
            }
            CtxStmnt::While { cond, .. } => extract_eager_calls(cond, known, calls),
            CtxStmnt::If { branches, .. } => {
                if let Some(first) = branches.first() {
                    extract_eager_calls(&first.cond, known, calls);
                }
                if always_returns(std::slice::from_ref(stmt)) {
                    return true;
                }
            }
            CtxStmnt::For { start, end, .. } => {
                extract_eager_calls(start, known, calls);
                extract_eager_calls(end, known, calls);
            }
            CtxStmnt::Block { body } => {
                if collect_unconditional(body, known, calls) {
                    return true;
                }
            }
            CtxStmnt::Return { value } => {
                if let Some(value) = value {
                    extract_eager_calls(value, known, calls);
                }
                return true;
            }
        }
    }
    false
}

/// Whether every path through `body` reaches a return
fn always_returns(body: &[CtxStmnt]) -> bool {
    body.iter().any(|stmt| match stmt {
        CtxStmnt::Return { .. } => true,
        CtxStmnt::Block { body } => always_returns(body),
        CtxStmnt::If {
            branches,
            else_body: Some(else_body),
        } => branches.iter().all(|b| always_returns(&b.body)) && always_returns(else_body),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::{CtxBranch, CtxFunc};
    use crate::types::Type;

    fn call(name: &str) -> CtxStmnt {
        CtxStmnt::Expr {
            expr: CtxExpr::call(name, Vec::new(), Type::int()),
        }
    }

    fn make_func(name: &str, calls: Vec<&str>) -> CtxFunc {
        CtxFunc {
            name: name.to_string(),
            executor: Type::world(),
            params: Vec::new(),
            return_type: None,
            body: calls.into_iter().map(call).collect(),
            public: false,
        }
    }

    fn module(functions: Vec<CtxFunc>) -> CtxModule {
        CtxModule {
            functions,
            script: Vec::new(),
        }
    }

    #[test]
    fn test_no_recursion() {
        let graph = CallGraph::build(&module(vec![
            make_func("foo", vec!["bar"]),
            make_func("bar", vec![]),
            make_func("baz", vec!["foo"]),
        ]));
        assert!(!graph.is_recursive("foo"));
        assert!(!graph.is_recursive("bar"));
        assert!(!graph.is_recursive("baz"));
        assert!(graph.recursive_cycles().is_empty());
    }

    #[test]
    fn test_direct_recursion() {
        let graph = CallGraph::build(&module(vec![
            make_func("countdown", vec!["countdown"]),
            make_func("helper", vec![]),
        ]));
        assert!(graph.is_recursive("countdown"));
        assert!(!graph.is_recursive("helper"));
        assert_eq!(graph.recursive_cycles().len(), 1);
        assert_eq!(graph.unconditional_self_calls(), vec!["countdown"]);
    }

    #[test]
    fn test_mutual_recursion_triple() {
        let graph = CallGraph::build(&module(vec![
            make_func("a", vec!["b"]),
            make_func("b", vec!["c"]),
            make_func("c", vec!["a"]),
        ]));
        assert!(graph.are_mutually_recursive("a", "b"));
        assert!(graph.are_mutually_recursive("b", "c"));
        assert!(graph.are_mutually_recursive("a", "c"));
        assert_eq!(graph.recursive_cycles().len(), 1);
        assert_eq!(graph.recursive_cycles()[0].len(), 3);
        // Mutual recursion is not a self call
        assert!(graph.unconditional_self_calls().is_empty());
    }

    #[test]
    fn test_calls_to_library_operations_are_ignored() {
        let mut foo = make_func("foo", vec!["print", "random_int"]);
        foo.body.push(CtxStmnt::Expr {
            expr: CtxExpr::library("print", vec![CtxExpr::str("hi")], Type::null()),
        });
        let graph = CallGraph::build(&module(vec![foo]));
        assert!(!graph.is_recursive("foo"));
        assert!(graph.callees("foo").unwrap().is_empty());
    }

    #[test]
    fn test_guarded_self_call_is_allowed() {
        let mut fact = make_func("fact", vec![]);
        fact.body.push(CtxStmnt::If {
            branches: vec![CtxBranch {
                cond: CtxExpr::bool(true),
                body: vec![call("fact")],
            }],
            else_body: None,
        });
        let graph = CallGraph::build(&module(vec![fact]));
        assert!(graph.is_recursive("fact"));
        assert!(graph.unconditional_self_calls().is_empty());
    }

    #[test]
    fn test_self_call_in_first_condition_is_unconditional() {
        let mut f = make_func("f", vec![]);
        f.body.push(CtxStmnt::If {
            branches: vec![CtxBranch {
                cond: CtxExpr::call("f", Vec::new(), Type::bool()),
                body: vec![],
            }],
            else_body: None,
        });
        let graph = CallGraph::build(&module(vec![f]));
        assert_eq!(graph.unconditional_self_calls(), vec!["f"]);
    }

    #[test]
    fn test_self_call_after_return_is_unreachable() {
        let mut f = make_func("f", vec![]);
        f.body.push(CtxStmnt::Return { value: None });
        f.body.push(call("f"));
        let graph = CallGraph::build(&module(vec![f]));
        assert!(graph.is_recursive("f"));
        assert!(graph.unconditional_self_calls().is_empty());
    }

    #[test]
    fn test_self_call_behind_coalesce_is_conditional() {
        let mut f = make_func("f", vec![]);
        f.body.push(CtxStmnt::Return {
            value: Some(CtxExpr::binary(
                BinOp::NullCoalesce,
                CtxExpr::null(),
                CtxExpr::call("f", Vec::new(), Type::int()),
                Type::int(),
            )),
        });
        let graph = CallGraph::build(&module(vec![f]));
        assert!(graph.is_recursive("f"));
        assert!(graph.unconditional_self_calls().is_empty());

        // The left side always runs
        let mut g = make_func("g", vec![]);
        g.body.push(CtxStmnt::Return {
            value: Some(CtxExpr::binary(
                BinOp::NullCoalesce,
                CtxExpr::call("g", Vec::new(), Type::int().nullable()),
                CtxExpr::int(0),
                Type::int(),
            )),
        });
        let graph = CallGraph::build(&module(vec![g]));
        assert_eq!(graph.unconditional_self_calls(), vec!["g"]);
    }

    #[test]
    fn test_self_call_after_returning_if_is_unreachable() {
        let returns = || vec![CtxStmnt::Return { value: None }];
        let mut f = make_func("f", vec![]);
        f.body.push(CtxStmnt::If {
            branches: vec![CtxBranch {
                cond: CtxExpr::bool(true),
                body: returns(),
            }],
            else_body: Some(vec![CtxStmnt::Block { body: returns() }]),
        });
        f.body.push(call("f"));
        let graph = CallGraph::build(&module(vec![f]));
        assert!(graph.unconditional_self_calls().is_empty());

        // Without an else the call is still reached
        let mut g = make_func("g", vec![]);
        g.body.push(CtxStmnt::If {
            branches: vec![CtxBranch {
                cond: CtxExpr::bool(true),
                body: returns(),
            }],
            else_body: None,
        });
        g.body.push(call("g"));
        let graph = CallGraph::build(&module(vec![g]));
        assert_eq!(graph.unconditional_self_calls(), vec!["g"]);
    }

    #[test]
    fn test_reachable_levels_stop_at_max_depth() {
        let graph = CallGraph::build(&module(vec![
            make_func("main", vec!["rec"]),
            make_func("rec", vec!["rec"]),
            make_func("unused", vec![]),
        ]));
        let levels = graph.reachable_levels(&["main".to_string()], 3);
        assert_eq!(levels["main"], BTreeSet::from([0]));
        assert_eq!(levels["rec"], BTreeSet::from([1, 2, 3]));
        assert!(!levels.contains_key("unused"));
    }

    #[test]
    fn test_reachable_levels_with_public_root() {
        let graph = CallGraph::build(&module(vec![
            make_func("a", vec!["b"]),
            make_func("b", vec![]),
        ]));
        let levels = graph.reachable_levels(&["a".to_string(), "b".to_string()], 8);
        assert_eq!(levels["b"], BTreeSet::from([0, 1]));
        let levels = graph.reachable_levels(&["a".to_string()], 0);
        assert!(!levels.contains_key("b"));
    }
}
