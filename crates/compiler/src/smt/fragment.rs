//! Fragment graph
//!
//! A function lowers into a tree of fragments. Each fragment is an append-only
//! list of commands that the target can invoke on its own; the only way two
//! fragments are connected is a (conditional) invocation command.
//!
//! Fragments are identified by their *route*: the `(flavour, count)` pairs from
//! the entry fragment down to them. `count` is the 1-based occurrence index of
//! that flavour among the children of one specific parent, so routes are unique
//! within a function and stable across compilations.

use super::command::SmtCmd;
use super::error::SmtError;
use std::collections::HashMap;

/// Why a fragment exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavour {
    /// Body of one branch of an if chain
    If,
    /// Body of a loop
    Loop,
    /// Condition check of a loop
    Cond,
    /// Continuation after a control-flow statement
    Top,
    /// Sink for statements that can never run
    Dead,
    /// Function entry
    Func,
}

impl Flavour {
    fn token(self) -> &'static str {
        match self {
            Flavour::If => "if",
            Flavour::Loop => "loop",
            Flavour::Cond => "cond",
            Flavour::Top => "top",
            Flavour::Dead => "dead",
            Flavour::Func => "func",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteNode {
    pub flavour: Flavour,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(pub usize);

#[derive(Debug)]
pub struct Fragment {
    route: Vec<RouteNode>,
    parent: Option<FragmentId>,
    cmds: Vec<SmtCmd>,
    child_counts: HashMap<Flavour, u32>,
}

impl Fragment {
    pub fn route(&self) -> &[RouteNode] {
        &self.route
    }

    pub fn parent(&self) -> Option<FragmentId> {
        self.parent
    }

    pub fn flavour(&self) -> Flavour {
        self.route.last().map_or(Flavour::Func, |node| node.flavour)
    }

    pub fn name(&self) -> String {
        route_name(&self.route)
    }

    pub fn commands(&self) -> &[SmtCmd] {
        &self.cmds
    }

    pub(crate) fn commands_mut(&mut self) -> &mut Vec<SmtCmd> {
        &mut self.cmds
    }
}

/// All fragments of one function; index 0 is the entry fragment
#[derive(Debug)]
pub struct FragmentGraph {
    fragments: Vec<Fragment>,
}

impl Default for FragmentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentGraph {
    pub fn new() -> Self {
        FragmentGraph {
            fragments: vec![Fragment {
                route: Vec::new(),
                parent: None,
                cmds: Vec::new(),
                child_counts: HashMap::new(),
            }],
        }
    }

    pub fn entry(&self) -> FragmentId {
        FragmentId(0)
    }

    /// Create a child of `parent`, extending its route by one node
    pub fn add_fragment(
        &mut self,
        parent: FragmentId,
        flavour: Flavour,
    ) -> Result<FragmentId, SmtError> {
        if flavour == Flavour::Func {
            return Err(SmtError::Representation(
                "only the function entry fragment may have the FUNC flavour".to_string(),
            ));
        }
        let parent_frag = self.fragments.get_mut(parent.0).ok_or_else(|| {
            SmtError::Representation(format!("parent fragment {:?} does not exist", parent))
        })?;

        let count = parent_frag.child_counts.entry(flavour).or_insert(0);
        *count += 1;
        let mut route = parent_frag.route.clone();
        route.push(RouteNode {
            flavour,
            count: *count,
        });

        let id = FragmentId(self.fragments.len());
        self.fragments.push(Fragment {
            route,
            parent: Some(parent),
            cmds: Vec::new(),
            child_counts: HashMap::new(),
        });
        Ok(id)
    }

    pub fn get(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: FragmentId) -> Option<&mut Fragment> {
        self.fragments.get_mut(id.0)
    }

    pub fn push(&mut self, id: FragmentId, cmds: Vec<SmtCmd>) -> Result<(), SmtError> {
        let fragment = self.fragments.get_mut(id.0).ok_or_else(|| {
            SmtError::Representation(format!("fragment {:?} does not exist", id))
        })?;
        fragment.cmds.extend(cmds);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FragmentId, &Fragment)> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(i, f)| (FragmentId(i), f))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Fragment> {
        self.fragments.iter_mut()
    }

    /// Every fragment except the entry
    pub fn children(&self) -> impl Iterator<Item = (FragmentId, &Fragment)> {
        self.iter().skip(1)
    }
}

/// Derive a file-safe name from a route.
///
/// Tokens are `flavour` + `count`, joined with `_`. A run of consecutive
/// `top1` nodes collapses into one run-length token (`top1x3`); since count
/// tokens are plain digits this encoding stays injective.
pub fn route_name(route: &[RouteNode]) -> String {
    if route.is_empty() {
        return "entry".to_string();
    }

    let is_top1 = |node: &RouteNode| node.flavour == Flavour::Top && node.count == 1;
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < route.len() {
        let node = &route[i];
        if is_top1(node) {
            let run = route[i..].iter().take_while(|&n| is_top1(n)).count();
            if run > 1 {
                tokens.push(format!("top1x{}", run));
            } else {
                tokens.push("top1".to_string());
            }
            i += run;
        } else {
            tokens.push(format!("{}{}", node.flavour.token(), node.count));
            i += 1;
        }
    }
    tokens.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn node(flavour: Flavour, count: u32) -> RouteNode {
        RouteNode { flavour, count }
    }

    #[test]
    fn test_counts_are_per_parent() {
        let mut graph = FragmentGraph::new();
        let entry = graph.entry();
        let a = graph.add_fragment(entry, Flavour::If).unwrap();
        let b = graph.add_fragment(entry, Flavour::If).unwrap();
        let c = graph.add_fragment(a, Flavour::If).unwrap();
        let d = graph.add_fragment(entry, Flavour::Top).unwrap();

        assert_eq!(graph.get(a).unwrap().route(), &[node(Flavour::If, 1)]);
        assert_eq!(graph.get(b).unwrap().route(), &[node(Flavour::If, 2)]);
        assert_eq!(
            graph.get(c).unwrap().route(),
            &[node(Flavour::If, 1), node(Flavour::If, 1)]
        );
        assert_eq!(graph.get(d).unwrap().route(), &[node(Flavour::Top, 1)]);
        assert_eq!(graph.get(c).unwrap().parent(), Some(a));
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_func_flavour_is_reserved() {
        let mut graph = FragmentGraph::new();
        let entry = graph.entry();
        assert!(graph.add_fragment(entry, Flavour::Func).is_err());
        assert!(graph.add_fragment(FragmentId(9), Flavour::If).is_err());
    }

    #[test]
    fn test_entry_name_and_flavour() {
        let graph = FragmentGraph::new();
        let entry = graph.get(graph.entry()).unwrap();
        assert_eq!(entry.name(), "entry");
        assert_eq!(entry.flavour(), Flavour::Func);
    }

    #[test]
    fn test_top_runs_collapse() {
        let route = [
            node(Flavour::Top, 1),
            node(Flavour::Top, 1),
            node(Flavour::Top, 1),
            node(Flavour::If, 2),
            node(Flavour::Top, 1),
            node(Flavour::Top, 2),
        ];
        assert_eq!(route_name(&route), "top1x3_if2_top1_top2");
        assert_eq!(route_name(&[node(Flavour::Cond, 1)]), "cond1");
    }

    /// Every route up to length 4 over a small alphabet must get its own name,
    /// including routes whose TOP runs cross what would be different parents.
    #[test]
    fn test_route_names_are_unique() {
        let alphabet: Vec<RouteNode> = [
            Flavour::If,
            Flavour::Loop,
            Flavour::Cond,
            Flavour::Top,
            Flavour::Dead,
        ]
        .iter()
        .flat_map(|&f| [node(f, 1), node(f, 2), node(f, 11)])
        .collect();

        let mut names = HashSet::new();
        let mut routes: Vec<Vec<RouteNode>> = vec![Vec::new()];
        let mut total = 0;
        for _ in 0..4 {
            let mut next = Vec::new();
            for route in &routes {
                for n in &alphabet {
                    let mut r = route.clone();
                    r.push(*n);
                    assert!(names.insert(route_name(&r)), "collision at {:?}", r);
                    total += 1;
                    next.push(r);
                }
            }
            routes = next;
        }
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_push_appends_in_order() {
        let mut graph = FragmentGraph::new();
        let entry = graph.entry();
        graph.push(entry, vec![SmtCmd::FrameCleanup]).unwrap();
        graph.push(entry, vec![SmtCmd::FrameCleanup]).unwrap();
        assert_eq!(graph.get(entry).unwrap().commands().len(), 2);
        assert!(graph.push(FragmentId(3), Vec::new()).is_err());
    }
}
