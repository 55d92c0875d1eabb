//! Phylogenetic tree over the genomes of an alignment.
//!
//! The tree is stored as an arena of [`TreeNode`] objects addressed by node identifiers.
//! Parent and child links are identifiers into the arena, and a separate map supports lookups by name.
//! The persisted form is a Newick string (see [`crate::formats`]).

use crate::{formats, HalError, Result};

use std::collections::{HashMap, VecDeque};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// A node in the tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    name: String,
    branch_length: f64,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl TreeNode {
    /// Returns the name of the node.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the length of the branch to the parent.
    ///
    /// The value is `0.0` for the root.
    #[inline]
    pub fn branch_length(&self) -> f64 {
        self.branch_length
    }

    /// Returns the identifier of the parent node, or [`None`] for the root.
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Returns the identifiers of the children in order.
    #[inline]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Returns `true` if the node has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

//-----------------------------------------------------------------------------

/// A rooted tree of uniquely named nodes with branch lengths.
///
/// Node names are unique, and the nodes always form a single rooted tree.
/// The tree can only be modified by adding a new root above the current root, adding a leaf, or removing a leaf.
///
/// # Examples
///
/// ```
/// use hal_base::TreeIndex;
///
/// let mut tree = TreeIndex::new();
/// tree.add_root("A", 0.0).unwrap();
/// tree.add_leaf("B", "A", 1.0).unwrap();
/// tree.add_leaf("C", "A", 2.0).unwrap();
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.children_of("A").unwrap(), vec!["B", "C"]);
/// assert_eq!(tree.parent_of("B").unwrap(), Some("A"));
/// assert_eq!(tree.branch_length("A", "C").unwrap(), 2.0);
/// assert_eq!(tree.to_newick(), "(B:1,C:2)A;");
///
/// let copy = TreeIndex::parse(&tree.to_newick()).unwrap();
/// assert_eq!(copy.to_newick(), tree.to_newick());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TreeIndex {
    nodes: Vec<TreeNode>,
    ids: HashMap<String, usize>,
    root: Option<usize>,
}

/// Construction and serialization.
impl TreeIndex {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a tree from a Newick string.
    ///
    /// An empty string (or a string containing only whitespace) is an empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::InvalidArgument`] if the string cannot be parsed or a node is unnamed.
    /// Returns [`HalError::DuplicateName`] if the same name occurs twice.
    pub fn parse(newick: &str) -> Result<Self> {
        let mut tree = TreeIndex::new();
        for node in formats::parse_newick(newick)? {
            match node.parent {
                Some(parent) => {
                    let parent_name = tree.nodes[parent].name.clone();
                    tree.add_leaf(&node.name, &parent_name, node.branch_length)?;
                },
                None => {
                    tree.add_root(&node.name, 0.0)?;
                },
            }
        }
        Ok(tree)
    }

    /// Returns the Newick representation of the tree.
    ///
    /// An empty tree is represented as an empty string.
    pub fn to_newick(&self) -> String {
        formats::write_newick(self)
    }
}

/// Queries.
impl TreeIndex {
    /// Returns the number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the identifier of the root, or [`None`] if the tree is empty.
    #[inline]
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Returns the name of the root, or [`None`] if the tree is empty.
    pub fn root_name(&self) -> Option<&str> {
        self.root.map(|id| self.nodes[id].name.as_str())
    }

    /// Returns `true` if the tree contains a node with the given name.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Returns the identifier of the node with the given name.
    #[inline]
    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    /// Returns the node with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier is invalid.
    #[inline]
    pub fn node(&self, id: usize) -> &TreeNode {
        &self.nodes[id]
    }

    /// Returns the node with the given name, or [`None`] if there is no such node.
    pub fn node_by_name(&self, name: &str) -> Option<&TreeNode> {
        self.id(name).map(|id| &self.nodes[id])
    }

    /// Returns an iterator over the node names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    fn existing(&self, name: &str) -> Result<usize> {
        self.id(name).ok_or_else(|| HalError::not_found(format!("node {}", name)))
    }

    /// Returns the name of the parent, or [`None`] if the node is the root.
    ///
    /// Returns [`HalError::NotFound`] if the node does not exist.
    pub fn parent_of(&self, name: &str) -> Result<Option<&str>> {
        let id = self.existing(name)?;
        Ok(self.nodes[id].parent.map(|parent| self.nodes[parent].name.as_str()))
    }

    /// Returns the length of the branch from `parent` to `child`.
    ///
    /// Returns [`HalError::NotFound`] if the child does not exist or its parent is not `parent`.
    pub fn branch_length(&self, parent: &str, child: &str) -> Result<f64> {
        let id = self.existing(child)?;
        let node = &self.nodes[id];
        match node.parent {
            Some(parent_id) if self.nodes[parent_id].name == parent => Ok(node.branch_length),
            _ => Err(HalError::not_found(format!("edge {}--{}", parent, child))),
        }
    }

    /// Returns the names of the children in order.
    ///
    /// Returns [`HalError::NotFound`] if the node does not exist.
    pub fn children_of(&self, name: &str) -> Result<Vec<&str>> {
        let id = self.existing(name)?;
        Ok(self.nodes[id].children.iter().map(|child| self.nodes[*child].name.as_str()).collect())
    }

    /// Returns the names of all leaves strictly below the node.
    ///
    /// The node itself is never included, even if it is a leaf.
    /// The order of the result is not meaningful.
    /// Returns [`HalError::NotFound`] if the node does not exist.
    pub fn leaves_below(&self, name: &str) -> Result<Vec<&str>> {
        let start = self.existing(name)?;
        let mut result = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(start);
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id];
            if node.is_leaf() && id != start {
                result.push(node.name.as_str());
            }
            queue.extend(node.children.iter().copied());
        }
        Ok(result)
    }

    /// Returns the names of all nodes in the subtree rooted at the node, including the node itself.
    ///
    /// The nodes are listed in preorder.
    /// Returns [`HalError::NotFound`] if the node does not exist.
    pub fn subtree(&self, name: &str) -> Result<Vec<&str>> {
        let start = self.existing(name)?;
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            result.push(node.name.as_str());
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(result)
    }
}

/// Modifications.
impl TreeIndex {
    fn check_new_node(&self, name: &str, branch_length: f64) -> Result<()> {
        if name.is_empty() {
            return Err(HalError::invalid("node name can't be empty"));
        }
        if self.contains(name) {
            return Err(HalError::DuplicateName(format!("node {} already exists", name)));
        }
        if !(branch_length >= 0.0) {
            return Err(HalError::invalid(format!("invalid branch length {} for node {}", branch_length, name)));
        }
        Ok(())
    }

    fn push_node(&mut self, name: &str, branch_length: f64, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            name: name.to_string(),
            branch_length,
            parent,
            children: Vec::new(),
        });
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Adds a new root and returns its identifier.
    ///
    /// If the tree already has a root, the old root becomes the only child of the new root.
    /// In that case, `branch_length` is the length of the branch from the new root to the old root.
    ///
    /// Returns [`HalError::DuplicateName`] if the name already exists.
    pub fn add_root(&mut self, name: &str, branch_length: f64) -> Result<usize> {
        self.check_new_node(name, branch_length)?;
        let id = self.push_node(name, 0.0, None);
        if let Some(old_root) = self.root {
            self.nodes[old_root].parent = Some(id);
            self.nodes[old_root].branch_length = branch_length;
            self.nodes[id].children.push(old_root);
        }
        self.root = Some(id);
        Ok(id)
    }

    /// Adds a new leaf as the last child of `parent` and returns its identifier.
    ///
    /// Returns [`HalError::DuplicateName`] if the name already exists and [`HalError::NotFound`] if the parent does not exist.
    pub fn add_leaf(&mut self, name: &str, parent: &str, branch_length: f64) -> Result<usize> {
        self.check_new_node(name, branch_length)?;
        let parent_id = self.id(parent).ok_or_else(
            || HalError::not_found(format!("parent {} not found in tree", parent))
        )?;
        let id = self.push_node(name, branch_length, Some(parent_id));
        self.nodes[parent_id].children.push(id);
        Ok(id)
    }

    /// Removes a leaf from the tree.
    ///
    /// If the leaf is the root, the tree becomes empty.
    /// Node identifiers may change.
    ///
    /// Returns [`HalError::NotFound`] if the node does not exist and [`HalError::InvalidArgument`] if it has children.
    pub fn remove_leaf(&mut self, name: &str) -> Result<()> {
        let id = self.existing(name)?;
        if !self.nodes[id].is_leaf() {
            return Err(HalError::invalid(format!("node {} is not a leaf", name)));
        }

        // Detach from the parent.
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|child| *child != id);
        } else {
            self.root = None;
        }
        self.ids.remove(name);

        // Move the last node into the free slot and update the links to it.
        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(id);
        if id != last {
            let moved = &self.nodes[id];
            self.ids.insert(moved.name.clone(), id);
            if let Some(parent) = moved.parent {
                for child in self.nodes[parent].children.iter_mut() {
                    if *child == last {
                        *child = id;
                    }
                }
            }
            let children = self.nodes[id].children.clone();
            for child in children {
                self.nodes[child].parent = Some(id);
            }
            if self.root == Some(last) {
                self.root = Some(id);
            }
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------
