use super::*;

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

//-----------------------------------------------------------------------------

fn add_root(tree: &mut TreeIndex, name: &str, branch_length: f64) {
    let result = tree.add_root(name, branch_length);
    assert!(result.is_ok(), "Failed to add root {}: {}", name, result.unwrap_err());
}

fn add_leaf(tree: &mut TreeIndex, name: &str, parent: &str, branch_length: f64) {
    let result = tree.add_leaf(name, parent, branch_length);
    assert!(result.is_ok(), "Failed to add leaf {} below {}: {}", name, parent, result.unwrap_err());
}

fn parse(newick: &str) -> TreeIndex {
    let result = TreeIndex::parse(newick);
    assert!(result.is_ok(), "Failed to parse {}: {}", newick, result.unwrap_err());
    result.unwrap()
}

// A -> (B -> (D, E), C)
fn example_tree() -> TreeIndex {
    let mut tree = TreeIndex::new();
    add_root(&mut tree, "A", 0.0);
    add_leaf(&mut tree, "B", "A", 1.0);
    add_leaf(&mut tree, "C", "A", 2.0);
    add_leaf(&mut tree, "D", "B", 0.5);
    add_leaf(&mut tree, "E", "B", 0.25);
    tree
}

fn sorted(mut names: Vec<&str>) -> Vec<&str> {
    names.sort_unstable();
    names
}

// Checks that parent and child links agree and that the name map is correct.
fn check_links(tree: &TreeIndex) {
    assert_eq!(tree.ids.len(), tree.len(), "Wrong number of names");
    if tree.is_empty() {
        assert!(tree.root().is_none(), "Empty tree has a root");
        return;
    }
    let root = tree.root();
    assert!(root.is_some(), "Non-empty tree has no root");
    assert!(tree.node(root.unwrap()).parent().is_none(), "Root has a parent");
    for id in 0..tree.len() {
        let node = tree.node(id);
        assert_eq!(tree.id(node.name()), Some(id), "Wrong identifier for node {}", node.name());
        if let Some(parent) = node.parent() {
            let count = tree.node(parent).children().iter().filter(|child| **child == id).count();
            assert_eq!(count, 1, "Node {} is not a child of its parent", node.name());
        } else {
            assert_eq!(Some(id), root, "Node {} has no parent but is not the root", node.name());
        }
        for child in node.children() {
            assert_eq!(tree.node(*child).parent(), Some(id), "Wrong parent for a child of {}", node.name());
        }
    }
    assert_eq!(tree.subtree(tree.root_name().unwrap()).unwrap().len(), tree.len(), "Some nodes are not reachable from the root");
}

//-----------------------------------------------------------------------------

#[test]
fn empty_tree() {
    let tree = TreeIndex::new();
    assert!(tree.is_empty(), "New tree is not empty");
    assert_eq!(tree.root_name(), None, "Empty tree has a root name");
    assert_eq!(tree.to_newick(), "", "Wrong Newick string for an empty tree");
    assert!(tree.parent_of("A").is_err(), "Got a parent for a missing node");

    let parsed = parse("");
    assert!(parsed.is_empty(), "Parsed an empty string into a non-empty tree");
    check_links(&parsed);
}

#[test]
fn navigation() {
    let tree = example_tree();
    check_links(&tree);
    assert_eq!(tree.len(), 5, "Wrong number of nodes");
    assert_eq!(tree.root_name(), Some("A"), "Wrong root");

    assert_eq!(tree.parent_of("A").unwrap(), None, "Root has a parent");
    assert_eq!(tree.parent_of("D").unwrap(), Some("B"), "Wrong parent for D");
    assert_eq!(tree.children_of("A").unwrap(), vec!["B", "C"], "Wrong children for A");
    assert_eq!(tree.children_of("B").unwrap(), vec!["D", "E"], "Wrong children for B");
    assert!(tree.children_of("C").unwrap().is_empty(), "Leaf has children");

    assert_eq!(tree.branch_length("A", "C").unwrap(), 2.0, "Wrong branch length for A--C");
    assert_eq!(tree.branch_length("B", "E").unwrap(), 0.25, "Wrong branch length for B--E");
    assert!(tree.branch_length("A", "D").is_err(), "Got a branch length for a non-edge");
    assert!(tree.branch_length("A", "X").is_err(), "Got a branch length for a missing node");

    assert_eq!(sorted(tree.leaves_below("A").unwrap()), vec!["C", "D", "E"], "Wrong leaves below A");
    assert_eq!(sorted(tree.leaves_below("B").unwrap()), vec!["D", "E"], "Wrong leaves below B");
    assert!(tree.leaves_below("C").unwrap().is_empty(), "A leaf has leaves below it");
    assert_eq!(tree.subtree("B").unwrap(), vec!["B", "D", "E"], "Wrong subtree for B");
    assert_eq!(tree.subtree("A").unwrap(), vec!["A", "B", "D", "E", "C"], "Wrong subtree for A");
}

#[test]
fn invalid_modifications() {
    let mut tree = example_tree();
    assert!(matches!(tree.add_leaf("B", "C", 1.0), Err(HalError::DuplicateName(_))), "Added a duplicate leaf");
    assert!(matches!(tree.add_root("C", 1.0), Err(HalError::DuplicateName(_))), "Added a duplicate root");
    assert!(matches!(tree.add_leaf("X", "Y", 1.0), Err(HalError::NotFound(_))), "Added a leaf below a missing parent");
    assert!(matches!(tree.add_leaf("", "A", 1.0), Err(HalError::InvalidArgument(_))), "Added an unnamed leaf");
    assert!(matches!(tree.add_leaf("X", "A", -1.0), Err(HalError::InvalidArgument(_))), "Added a negative branch length");
    assert!(matches!(tree.add_leaf("X", "A", f64::NAN), Err(HalError::InvalidArgument(_))), "Added a NaN branch length");
    assert!(matches!(tree.remove_leaf("B"), Err(HalError::InvalidArgument(_))), "Removed an internal node");
    assert!(matches!(tree.remove_leaf("X"), Err(HalError::NotFound(_))), "Removed a missing node");
    assert_eq!(tree.len(), 5, "Failed modifications changed the tree");
    check_links(&tree);
}

#[test]
fn new_root() {
    let mut tree = example_tree();
    add_root(&mut tree, "R", 3.0);
    check_links(&tree);
    assert_eq!(tree.root_name(), Some("R"), "Wrong root");
    assert_eq!(tree.children_of("R").unwrap(), vec!["A"], "Wrong children for the new root");
    assert_eq!(tree.branch_length("R", "A").unwrap(), 3.0, "Wrong branch length to the old root");
    assert_eq!(tree.node_by_name("R").unwrap().branch_length(), 0.0, "New root has a branch length");
}

#[test]
fn remove_leaves() {
    let mut tree = example_tree();
    assert!(tree.remove_leaf("D").is_ok(), "Failed to remove D");
    check_links(&tree);
    assert_eq!(tree.children_of("B").unwrap(), vec!["E"], "Wrong children for B after removal");
    assert!(!tree.contains("D"), "Removed node is still in the tree");

    for name in ["E", "B", "C", "A"] {
        let result = tree.remove_leaf(name);
        assert!(result.is_ok(), "Failed to remove {}: {}", name, result.unwrap_err());
        check_links(&tree);
    }
    assert!(tree.is_empty(), "Tree is not empty after removing all nodes");
    assert_eq!(tree.to_newick(), "", "Wrong Newick string after removing all nodes");
}

#[test]
fn newick_round_trip() {
    let tree = example_tree();
    let newick = tree.to_newick();
    assert_eq!(newick, "((D:0.5,E:0.25)B:1,C:2)A;", "Wrong Newick string");
    let parsed = parse(&newick);
    check_links(&parsed);
    assert_eq!(parsed.to_newick(), newick, "Newick string changed in a round trip");
    assert_eq!(parsed.children_of("B").unwrap(), vec!["D", "E"], "Child order changed in a round trip");
}

#[test]
fn invalid_newick() {
    for newick in ["(B,C);", "(B:1,C:2", "(B:1,C:x)A;", "(B,B)A;", "A;B;", "()A;", "((B)C;", "(B)C)A;"] {
        assert!(TreeIndex::parse(newick).is_err(), "Parsed an invalid tree {}", newick);
    }
}

#[test]
fn deep_tree() {
    // Repeated new roots build a path deep enough to exhaust the stack with recursion.
    let depth = 200_000;
    let mut tree = TreeIndex::new();
    for i in 0..depth {
        add_root(&mut tree, &format!("N{}", i), 1.0);
    }
    let newick = tree.to_newick();
    assert!(newick.starts_with("((("), "Wrong Newick string for a deep tree");
    assert!(newick.ends_with(&format!("N{};", depth - 1)), "Wrong root in the Newick string for a deep tree");

    let parsed = parse(&newick);
    assert_eq!(parsed.len(), depth, "Wrong number of nodes in a deep tree");
    assert_eq!(parsed.root_name(), Some(format!("N{}", depth - 1).as_str()), "Wrong root for a deep tree");
    assert_eq!(parsed.parent_of("N0").unwrap(), Some("N1"), "Wrong parent for the deepest node");
    assert_eq!(parsed.leaves_below(&format!("N{}", depth - 1)).unwrap(), vec!["N0"], "Wrong leaves for a deep tree");
    assert_eq!(parsed.to_newick(), newick, "Newick string for a deep tree changed in a round trip");
}

//-----------------------------------------------------------------------------

#[test]
fn random_trees() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for round in 0..20 {
        let mut tree = TreeIndex::new();
        let mut names: Vec<String> = Vec::new();
        for i in 0..30 {
            let name = format!("g{}", i);
            let branch_length = rng.gen_range(0..100) as f64 / 4.0;
            if names.is_empty() || rng.gen_bool(0.1) {
                add_root(&mut tree, &name, branch_length);
            } else {
                let parent = names[rng.gen_range(0..names.len())].clone();
                add_leaf(&mut tree, &name, &parent, branch_length);
            }
            names.push(name);
        }
        check_links(&tree);

        let parsed = parse(&tree.to_newick());
        check_links(&parsed);
        assert_eq!(parsed.len(), tree.len(), "Wrong number of nodes after parsing in round {}", round);
        for name in names.iter() {
            assert_eq!(parsed.parent_of(name).unwrap(), tree.parent_of(name).unwrap(), "Wrong parent for {} in round {}", name, round);
            assert_eq!(parsed.children_of(name).unwrap(), tree.children_of(name).unwrap(), "Wrong children for {} in round {}", name, round);
        }

        // Remove random leaves until the tree is empty.
        while !tree.is_empty() {
            let leaves: Vec<String> = tree.names().filter(|name| tree.node_by_name(name).unwrap().is_leaf()).map(String::from).collect();
            let leaf = &leaves[rng.gen_range(0..leaves.len())];
            let result = tree.remove_leaf(leaf);
            assert!(result.is_ok(), "Failed to remove leaf {} in round {}: {}", leaf, round, result.unwrap_err());
            check_links(&tree);
        }
    }
}

//-----------------------------------------------------------------------------
