#![allow(dead_code)]

use macroseq::config::{Action, CommandNode, NodeLocation, validate_commands};
use macroseq::dag::{Guard, TerminationCondition};
use macroseq::types::Modifier;

/// Builder for an ordered command list, numbering commands as they are
/// added.
#[derive(Debug, Default)]
pub struct MacroBuilder {
    nodes: Vec<CommandNode>,
}

impl MacroBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, node: NodeBuilder) -> Self {
        let index = self.nodes.len() + 1;
        self.nodes.push(node.into_node(index));
        self
    }

    /// Build and validate the list.
    pub fn build(self) -> Vec<CommandNode> {
        validate_commands(&self.nodes).expect("Failed to build valid macro from builder");
        self.nodes
    }

    /// Build without validation, for exercising the graph builder directly.
    pub fn build_unchecked(self) -> Vec<CommandNode> {
        self.nodes
    }
}

/// Builder for one `CommandNode`.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: Option<String>,
    action: Action,
    modifier: Modifier,
    after: Vec<String>,
    guard: Option<Guard>,
}

impl NodeBuilder {
    pub fn new(action: Action) -> Self {
        Self {
            name: None,
            action,
            modifier: Modifier::None,
            after: Vec::new(),
            guard: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// START modifier.
    pub fn start(mut self) -> Self {
        self.modifier = Modifier::Start;
        self
    }

    /// AFTER modifier.
    pub fn after(mut self, names: &[&str]) -> Self {
        self.modifier = Modifier::After;
        self.after = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Skip guard such as `"build==0"`.
    pub fn when(mut self, expr: &str) -> Self {
        self.guard = Some(expr.parse().expect("invalid guard in test"));
        self
    }

    fn into_node(self, index: usize) -> CommandNode {
        CommandNode {
            location: NodeLocation {
                index,
                name: self.name.clone(),
            },
            name: self.name,
            action: self.action,
            modifier: self.modifier,
            after: self.after,
            guard: self.guard,
        }
    }
}

/// `run` command named `name` whose program is also `name`.
pub fn run(name: &str) -> NodeBuilder {
    NodeBuilder::new(Action::Run {
        args: vec![name.to_string()],
    })
    .named(name)
}

/// `run` command with an explicit argv.
pub fn run_args(name: &str, args: &[&str]) -> NodeBuilder {
    NodeBuilder::new(Action::Run {
        args: args.iter().map(|s| s.to_string()).collect(),
    })
    .named(name)
}

/// Group member named `name` whose program is also `name`.
pub fn group(name: &str) -> NodeBuilder {
    NodeBuilder::new(Action::Group {
        args: vec![name.to_string()],
    })
    .named(name)
}

pub fn shell(name: &str, line: &str) -> NodeBuilder {
    NodeBuilder::new(Action::Shell {
        line: line.to_string(),
    })
    .named(name)
}

pub fn wait(targets: &[&str]) -> NodeBuilder {
    NodeBuilder::new(Action::Wait {
        targets: targets.iter().map(|s| s.to_string()).collect(),
    })
}

pub fn errorcond(expr: &str) -> NodeBuilder {
    let condition: TerminationCondition = expr.parse().expect("invalid condition in test");
    NodeBuilder::new(Action::SetErrorCondition(condition))
}

pub fn exit(code: Option<i32>) -> NodeBuilder {
    NodeBuilder::new(Action::Exit { code })
}

pub fn echo(text: &str) -> NodeBuilder {
    NodeBuilder::new(Action::Echo {
        text: text.to_string(),
    })
}

pub fn comment(text: &str) -> NodeBuilder {
    NodeBuilder::new(Action::Comment {
        text: text.to_string(),
    })
}
