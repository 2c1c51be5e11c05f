// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tree of tests known to cricket.
//!
//! The tree has exactly three levels: suites contain groups, and groups contain cases. Every node
//! is addressed by its dotted path (`suite.group.case`), which is also how the producer names
//! cases on the wire.
//!
//! Only cases carry results. Activation is stored on every node, but for suites and groups it's
//! derived: a group is active iff at least one of its cases is, and a suite is active iff at least
//! one of its groups is. Every mutating operation returns the [`NodeEvent`]s it caused, so
//! observers can stay in sync without any ambient registration.

use crate::errors::TestPathParseError;
use serde::Serialize;
use smallvec::SmallVec;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    time::Duration,
};

/// The events produced by a single mutation of the tree.
pub type NodeEvents = SmallVec<[NodeEvent; 4]>;

/// An index into a [`TestTree`].
///
/// Node IDs are stable for the lifetime of the tree: nodes are never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// The kind of a node in the test tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// A top-level grouping of test groups.
    Suite,

    /// A collection of related test cases.
    Group,

    /// A single executable test.
    Case,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Suite => write!(f, "suite"),
            NodeKind::Group => write!(f, "group"),
            NodeKind::Case => write!(f, "case"),
        }
    }
}

/// The resolved status of a test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum TestStatus {
    /// The test passed.
    Pass,

    /// The test was skipped.
    Skip,

    /// The test failed an assertion.
    Fail,

    /// The test failed, and was expected to.
    ExpectedFail,

    /// The test passed, but was expected to fail.
    UnexpectedSuccess,

    /// The test raised an error, or its result couldn't be decoded.
    Error,
}

impl TestStatus {
    /// Returns a human-readable description of this status.
    pub fn description(self) -> &'static str {
        match self {
            TestStatus::Pass => "Pass",
            TestStatus::Skip => "Skipped",
            TestStatus::Fail => "Failure",
            TestStatus::ExpectedFail => "Expected failure",
            TestStatus::UnexpectedSuccess => "Unexpected success",
            TestStatus::Error => "Error",
        }
    }

    /// Returns a short tag for this status, suitable for use as a style or CSS class name.
    pub fn tag(self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Skip => "skip",
            TestStatus::Fail => "fail",
            TestStatus::ExpectedFail => "expected",
            TestStatus::UnexpectedSuccess => "unexpected",
            TestStatus::Error => "error",
        }
    }

    /// Returns the color this status is displayed in.
    pub fn color(self) -> StatusColor {
        match self {
            TestStatus::Pass => StatusColor::Green,
            TestStatus::Skip | TestStatus::ExpectedFail => StatusColor::Blue,
            TestStatus::Fail | TestStatus::UnexpectedSuccess | TestStatus::Error => {
                StatusColor::Red
            }
        }
    }

    /// Returns true if this status should count as a failure of the run.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TestStatus::Fail | TestStatus::UnexpectedSuccess | TestStatus::Error
        )
    }
}

/// Returns the description for an optional status, where `None` means the case hasn't run.
pub fn status_description(status: Option<TestStatus>) -> &'static str {
    status.map_or("Not executed", TestStatus::description)
}

/// Returns the color for an optional status, where `None` means the case hasn't run.
pub fn status_color(status: Option<TestStatus>) -> StatusColor {
    status.map_or(StatusColor::Gray, TestStatus::color)
}

/// The color a status is displayed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusColor {
    /// Successful outcomes.
    Green,

    /// Outcomes that are neither successes nor failures.
    Blue,

    /// Failures.
    Red,

    /// Not executed yet.
    Gray,
}

/// The decoded outcome of one execution of a test case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// The resolved status.
    pub status: TestStatus,

    /// The error or skip text, if any.
    pub error: Option<String>,

    /// How long the test took.
    pub duration: Duration,
}

/// A node in the [`TestTree`].
#[derive(Clone, Debug)]
pub struct TestNode {
    path: String,
    name: String,
    parent: Option<NodeId>,
    active: bool,
    data: NodeData,
}

#[derive(Clone, Debug)]
enum NodeData {
    Suite { children: BTreeMap<String, NodeId> },
    Group { children: BTreeMap<String, NodeId> },
    Case(CaseData),
}

#[derive(Clone, Debug, Default)]
struct CaseData {
    description: Option<String>,
    last_result: Option<TestResult>,
}

impl TestNode {
    /// Returns the full dotted path of this node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the display name of this node: the last segment of its path.
    ///
    /// Group names may themselves contain dots.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind of this node.
    pub fn kind(&self) -> NodeKind {
        match &self.data {
            NodeData::Suite { .. } => NodeKind::Suite,
            NodeData::Group { .. } => NodeKind::Group,
            NodeData::Case(_) => NodeKind::Case,
        }
    }

    /// Returns the parent of this node, or `None` for suites.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns true if this node will be included in the next run.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the children of this node, sorted by name. Cases have no children.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        let children = match &self.data {
            NodeData::Suite { children } | NodeData::Group { children } => Some(children),
            NodeData::Case(_) => None,
        };
        children.into_iter().flat_map(|c| c.values().copied())
    }

    /// Returns the resolved status of this case, or `None` if it hasn't been resolved yet or this
    /// isn't a case.
    pub fn status(&self) -> Option<TestStatus> {
        self.last_result().map(|result| result.status)
    }

    /// Returns the last result recorded for this case.
    pub fn last_result(&self) -> Option<&TestResult> {
        match &self.data {
            NodeData::Case(data) => data.last_result.as_ref(),
            _ => None,
        }
    }

    /// Returns the description of this case, if discovery provided one.
    pub fn description(&self) -> Option<&str> {
        match &self.data {
            NodeData::Case(data) => data.description.as_deref(),
            _ => None,
        }
    }
}

/// A change to the tree that observers may want to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// A node was created after the tree was constructed.
    Added {
        /// The path of the new node.
        path: String,

        /// The kind of the new node.
        kind: NodeKind,
    },

    /// A node's activation flag changed.
    ActivationChanged {
        /// The path of the node.
        path: String,

        /// The new activation flag.
        active: bool,
    },

    /// A case started running.
    Running {
        /// The path of the case.
        path: String,
    },

    /// A case resolved with a result.
    Resolved {
        /// The path of the case.
        path: String,

        /// The decoded result.
        result: TestResult,
    },
}

/// A dotted case path split into its suite, group and case segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CasePath<'a> {
    /// The suite segment.
    pub suite: &'a str,

    /// The group segment. This may contain dots.
    pub group: &'a str,

    /// The case segment.
    pub case: &'a str,
}

impl<'a> CasePath<'a> {
    /// Parses a dotted path with at least three segments. The first segment is the suite, the last
    /// is the case, and everything in between is the group.
    pub fn parse(path: &'a str) -> Result<Self, TestPathParseError> {
        if path.split('.').any(str::is_empty) {
            return Err(TestPathParseError::new(path, "empty path segment"));
        }
        let (suite, rest) = path
            .split_once('.')
            .ok_or_else(|| TestPathParseError::new(path, "expected suite.group.case"))?;
        let (group, case) = rest
            .rsplit_once('.')
            .ok_or_else(|| TestPathParseError::new(path, "expected suite.group.case"))?;

        Ok(Self { suite, group, case })
    }

    fn group_path(&self) -> String {
        format!("{}.{}", self.suite, self.group)
    }
}

/// The tree of suites, groups and cases.
#[derive(Clone, Debug, Default)]
pub struct TestTree {
    nodes: Vec<TestNode>,
    suites: BTreeMap<String, NodeId>,
    by_path: HashMap<String, NodeId>,
}

impl TestTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a list of case paths. Every case starts out active.
    ///
    /// Duplicate paths collapse into a single case.
    pub fn from_paths(
        paths: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, TestPathParseError> {
        let mut tree = Self::new();
        for path in paths {
            tree.resolve_or_create(path.as_ref())?;
        }
        Ok(tree)
    }

    /// Adds a case with a description, as produced by discovery.
    ///
    /// If the case already exists, its description is replaced.
    pub fn insert_case(
        &mut self,
        path: &str,
        description: Option<String>,
    ) -> Result<NodeId, TestPathParseError> {
        let (id, _) = self.resolve_or_create(path)?;
        if let NodeData::Case(data) = &mut self.nodes[id.0].data {
            data.description = description;
        }
        Ok(id)
    }

    /// Returns the node with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID belongs to a different tree.
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }

    /// Looks up a node (of any kind) by path.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Looks up a node (of any kind) by path.
    pub fn get(&self, path: &str) -> Option<&TestNode> {
        self.find(path).map(|id| self.node(id))
    }

    /// Iterates over the suites in this tree, sorted by name.
    pub fn suites(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.suites.values().copied()
    }

    /// Iterates over every case in the tree, in sorted order.
    pub fn cases(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.suites().flat_map(move |suite| self.descendant_cases(suite))
    }

    /// Returns the total number of cases.
    pub fn case_count(&self) -> usize {
        self.cases().count()
    }

    /// Returns the number of active cases: the number of tests the next run will execute.
    pub fn active_case_count(&self) -> usize {
        self.cases().filter(|id| self.node(*id).active).count()
    }

    /// Returns the node for a case path, creating it (and its suite and group) if necessary.
    ///
    /// Newly created nodes are active. Resolving the same path twice returns the same node.
    pub fn resolve_or_create(
        &mut self,
        path: &str,
    ) -> Result<(NodeId, NodeEvents), TestPathParseError> {
        if let Some(id) = self.find(path) {
            return match self.node(id).kind() {
                NodeKind::Case => Ok((id, NodeEvents::new())),
                kind => Err(TestPathParseError::new(
                    path,
                    match kind {
                        NodeKind::Suite => "path names an existing suite",
                        _ => "path names an existing group",
                    },
                )),
            };
        }

        let case_path = CasePath::parse(path)?;
        let mut events = NodeEvents::new();

        let suite = match self.suites.get(case_path.suite) {
            Some(&suite) => suite,
            None => {
                let suite = self.push_node(
                    case_path.suite.to_owned(),
                    case_path.suite.to_owned(),
                    None,
                    NodeData::Suite {
                        children: BTreeMap::new(),
                    },
                );
                self.suites.insert(case_path.suite.to_owned(), suite);
                events.push(NodeEvent::Added {
                    path: case_path.suite.to_owned(),
                    kind: NodeKind::Suite,
                });
                suite
            }
        };

        let group_path = case_path.group_path();
        let group = match self.find(&group_path) {
            Some(group) if self.node(group).kind() == NodeKind::Group => group,
            Some(_) => {
                return Err(TestPathParseError::new(
                    path,
                    "group path names an existing case",
                ));
            }
            None => {
                let group = self.push_node(
                    group_path.clone(),
                    case_path.group.to_owned(),
                    Some(suite),
                    NodeData::Group {
                        children: BTreeMap::new(),
                    },
                );
                self.insert_child(suite, case_path.group, group);
                events.push(NodeEvent::Added {
                    path: group_path,
                    kind: NodeKind::Group,
                });
                group
            }
        };

        let case = self.push_node(
            path.to_owned(),
            case_path.case.to_owned(),
            Some(group),
            NodeData::Case(CaseData::default()),
        );
        self.insert_child(group, case_path.case, case);
        events.push(NodeEvent::Added {
            path: path.to_owned(),
            kind: NodeKind::Case,
        });

        // A new active case may flip an inactive group or suite back on.
        self.recompute_ancestors(case, &mut events);

        Ok((case, events))
    }

    /// Sets the activation flag for a node.
    ///
    /// For a case, this sets the case and recomputes its group and suite. For a group or a suite,
    /// this sets every descendant case.
    pub fn set_active(&mut self, id: NodeId, active: bool) -> NodeEvents {
        let mut events = NodeEvents::new();
        let cases: Vec<_> = self.descendant_cases(id).collect();
        for case in &cases {
            self.set_flag(*case, active, &mut events);
        }

        match self.node(id).kind() {
            NodeKind::Case => self.recompute_ancestors(id, &mut events),
            NodeKind::Group => {
                self.recompute(id, &mut events);
                self.recompute_ancestors(id, &mut events);
            }
            NodeKind::Suite => {
                let groups: Vec<_> = self.node(id).children().collect();
                for group in groups {
                    self.recompute(group, &mut events);
                }
                self.recompute(id, &mut events);
            }
        }

        events
    }

    /// Toggles the activation flag for a node.
    ///
    /// An active group or suite is deactivated entirely; an inactive one is activated entirely.
    pub fn toggle_active(&mut self, id: NodeId) -> NodeEvents {
        let active = self.node(id).active;
        self.set_active(id, !active)
    }

    /// Sets every case in the tree to the given activation state.
    pub fn set_all_active(&mut self, active: bool) -> NodeEvents {
        let suites: Vec<_> = self.suites().collect();
        let mut events = NodeEvents::new();
        for suite in suites {
            events.extend(self.set_active(suite, active));
        }
        events
    }

    /// Records that a case has started running.
    pub fn mark_running(&self, id: NodeId) -> NodeEvent {
        NodeEvent::Running {
            path: self.node(id).path.clone(),
        }
    }

    /// Records a result for a case, replacing any earlier result.
    ///
    /// Has no effect (and returns no events) if `id` isn't a case.
    pub fn set_result(&mut self, id: NodeId, result: TestResult) -> NodeEvents {
        let node = &mut self.nodes[id.0];
        let mut events = NodeEvents::new();
        if let NodeData::Case(data) = &mut node.data {
            data.last_result = Some(result.clone());
            events.push(NodeEvent::Resolved {
                path: node.path.clone(),
                result,
            });
        }
        events
    }

    /// Returns the labels to pass to the producer to run exactly the active cases.
    ///
    /// This is empty if every case is active, meaning "run everything". Otherwise, whole suites
    /// and groups are named where all of their cases are active, and individual cases elsewhere.
    pub fn test_labels(&self) -> Vec<String> {
        if self.cases().all(|id| self.node(id).active) {
            return Vec::new();
        }

        let mut labels = Vec::new();
        for suite in self.suites() {
            match self.activation(suite) {
                Activation::All => labels.push(self.node(suite).path.clone()),
                Activation::None => {}
                Activation::Some => {
                    for group in self.node(suite).children() {
                        match self.activation(group) {
                            Activation::All => labels.push(self.node(group).path.clone()),
                            Activation::None => {}
                            Activation::Some => labels.extend(
                                self.node(group)
                                    .children()
                                    .filter(|case| self.node(*case).active)
                                    .map(|case| self.node(case).path.clone()),
                            ),
                        }
                    }
                }
            }
        }
        labels
    }

    /// Returns a summary of a case suitable for a details pane.
    pub fn case_details(&self, path: &str) -> Option<CaseDetails<'_>> {
        let node = self.get(path)?;
        match &node.data {
            NodeData::Case(data) => Some(CaseDetails {
                path: &node.path,
                description: data.description.as_deref(),
                status: node.status(),
                result: data.last_result.as_ref(),
            }),
            _ => None,
        }
    }

    /// Returns a serializable summary of the tree.
    pub fn to_summary(&self) -> TestTreeSummary {
        let suites = self
            .suites()
            .map(|suite| {
                let groups: BTreeMap<_, _> = self
                    .node(suite)
                    .children()
                    .map(|group| {
                        let cases: BTreeMap<_, _> = self
                            .node(group)
                            .children()
                            .map(|case| {
                                let node = self.node(case);
                                (
                                    node.name.clone(),
                                    CaseSummary {
                                        active: node.active,
                                        description: node.description().map(str::to_owned),
                                        last_result: node.last_result().cloned(),
                                    },
                                )
                            })
                            .collect();
                        (self.node(group).name.clone(), cases)
                    })
                    .collect();
                (self.node(suite).name.clone(), groups)
            })
            .collect();
        TestTreeSummary { suites }
    }

    // ---
    // Helper methods
    // ---

    fn push_node(
        &mut self,
        path: String,
        name: String,
        parent: Option<NodeId>,
        data: NodeData,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_path.insert(path.clone(), id);
        self.nodes.push(TestNode {
            path,
            name,
            parent,
            // Groups and suites are recomputed once their first case is added.
            active: matches!(data, NodeData::Case(_)),
            data,
        });
        id
    }

    fn insert_child(&mut self, parent: NodeId, name: &str, child: NodeId) {
        match &mut self.nodes[parent.0].data {
            NodeData::Suite { children } | NodeData::Group { children } => {
                children.insert(name.to_owned(), child);
            }
            NodeData::Case(_) => unreachable!("cases never have children"),
        }
    }

    fn descendant_cases(&self, id: NodeId) -> Box<dyn Iterator<Item = NodeId> + '_> {
        match self.node(id).kind() {
            NodeKind::Case => Box::new(std::iter::once(id)),
            _ => Box::new(
                self.node(id)
                    .children()
                    .flat_map(move |child| self.descendant_cases(child)),
            ),
        }
    }

    fn activation(&self, id: NodeId) -> Activation {
        let (mut any, mut all) = (false, true);
        for case in self.descendant_cases(id) {
            if self.node(case).active {
                any = true;
            } else {
                all = false;
            }
        }
        match (any, all) {
            (true, true) => Activation::All,
            (false, _) => Activation::None,
            (true, false) => Activation::Some,
        }
    }

    fn set_flag(&mut self, id: NodeId, active: bool, events: &mut NodeEvents) {
        let node = &mut self.nodes[id.0];
        if node.active != active {
            node.active = active;
            events.push(NodeEvent::ActivationChanged {
                path: node.path.clone(),
                active,
            });
        }
    }

    fn recompute(&mut self, id: NodeId, events: &mut NodeEvents) {
        let active = self
            .node(id)
            .children()
            .any(|child| self.node(child).active);
        self.set_flag(id, active, events);
    }

    fn recompute_ancestors(&mut self, id: NodeId, events: &mut NodeEvents) {
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            self.recompute(parent, events);
            current = self.node(parent).parent;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Activation {
    All,
    Some,
    None,
}

/// Details about a single case, as shown in a details pane.
#[derive(Clone, Copy, Debug)]
pub struct CaseDetails<'a> {
    /// The path of the case.
    pub path: &'a str,

    /// The description provided by discovery.
    pub description: Option<&'a str>,

    /// The resolved status, if any.
    pub status: Option<TestStatus>,

    /// The last result, if any.
    pub result: Option<&'a TestResult>,
}

impl CaseDetails<'_> {
    /// Returns the description of the status.
    pub fn status_description(&self) -> &'static str {
        status_description(self.status)
    }

    /// Returns the duration formatted to two decimal places, or "Not executed".
    pub fn duration_display(&self) -> String {
        match self.result {
            Some(result) => format!("{:.2}s", result.duration.as_secs_f64()),
            None => "Not executed".to_owned(),
        }
    }

    /// Returns the error text of the last result, if any.
    pub fn error(&self) -> Option<&str> {
        self.result.and_then(|result| result.error.as_deref())
    }
}

/// A serializable summary of a [`TestTree`]: suite name → group name → case name → case.
#[derive(Clone, Debug, Serialize)]
pub struct TestTreeSummary {
    /// The suites in the tree.
    pub suites: BTreeMap<String, BTreeMap<String, BTreeMap<String, CaseSummary>>>,
}

/// A serializable summary of a single case.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaseSummary {
    /// Whether the case will run next time.
    pub active: bool,

    /// The description provided by discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The last result recorded for this case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<TestResult>,
}
