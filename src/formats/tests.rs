use super::*;

//-----------------------------------------------------------------------------

fn parse(newick: &str) -> Vec<NewickNode> {
    let result = parse_newick(newick);
    assert!(result.is_ok(), "Failed to parse {}: {}", newick, result.unwrap_err());
    result.unwrap()
}

fn check_nodes(nodes: &[NewickNode], truth: &[(&str, Option<usize>, f64)], newick: &str) {
    assert_eq!(nodes.len(), truth.len(), "Wrong number of nodes in {}", newick);
    for (i, (node, (name, parent, branch_length))) in nodes.iter().zip(truth.iter()).enumerate() {
        assert_eq!(node.name, *name, "Wrong name for node {} in {}", i, newick);
        assert_eq!(node.parent, *parent, "Wrong parent for node {} in {}", i, newick);
        assert_eq!(node.branch_length, *branch_length, "Wrong branch length for node {} in {}", i, newick);
    }
}

//-----------------------------------------------------------------------------

#[test]
fn parse_simple() {
    let newick = "((D:0.5,E:0.25)B:1,C:2)A;";
    let nodes = parse(newick);
    let truth = [
        ("A", None, 0.0),
        ("B", Some(0), 1.0),
        ("D", Some(1), 0.5),
        ("E", Some(1), 0.25),
        ("C", Some(0), 2.0),
    ];
    check_nodes(&nodes, &truth, newick);
}

#[test]
fn parse_single_node() {
    for newick in ["A", "A;", "  A ; ", "A:0;"] {
        let nodes = parse(newick);
        check_nodes(&nodes, &[("A", None, 0.0)], newick);
    }
}

#[test]
fn parse_empty() {
    for newick in ["", "   ", "\n"] {
        let nodes = parse(newick);
        assert!(nodes.is_empty(), "Got nodes from an empty string {:?}", newick);
    }
}

#[test]
fn parse_whitespace_and_comments() {
    let newick = "( B : 1 [first child] ,\n  C:2e-1 ) A [root] ;";
    let nodes = parse(newick);
    let truth = [
        ("A", None, 0.0),
        ("B", Some(0), 1.0),
        ("C", Some(0), 0.2),
    ];
    check_nodes(&nodes, &truth, newick);
}

#[test]
fn parse_quoted_labels() {
    let newick = "('B (x)':1,'it''s':2)'root node';";
    let nodes = parse(newick);
    let truth = [
        ("root node", None, 0.0),
        ("B (x)", Some(0), 1.0),
        ("it's", Some(0), 2.0),
    ];
    check_nodes(&nodes, &truth, newick);
}

#[test]
fn parse_errors() {
    let invalid = [
        "(B,C);",        // Unnamed root.
        "(,B)A;",        // Unnamed leaf.
        "(B:1,C:2",      // Missing closing parenthesis.
        "(B:one)A;",     // Invalid branch length.
        "('B:1)A;",      // Unterminated quote.
        "(B[x:1)A;",     // Unterminated comment.
        "A;B",           // Trailing characters.
    ];
    for newick in invalid {
        let result = parse_newick(newick);
        assert!(matches!(result, Err(HalError::InvalidArgument(_))), "Parsed an invalid string {}", newick);
    }
}

//-----------------------------------------------------------------------------

#[test]
fn write_trees() {
    let mut tree = TreeIndex::new();
    assert_eq!(write_newick(&tree), "", "Wrong output for an empty tree");

    tree.add_root("A", 0.0).unwrap();
    assert_eq!(write_newick(&tree), "A;", "Wrong output for a single node");

    tree.add_leaf("B", "A", 1.5).unwrap();
    tree.add_leaf("C d", "A", 2.0).unwrap();
    tree.add_leaf("it's", "B", 0.0).unwrap();
    let newick = write_newick(&tree);
    assert_eq!(newick, "(('it''s':0)B:1.5,'C d':2)A;", "Wrong output with quoted labels");

    let nodes = parse(&newick);
    let truth = [
        ("A", None, 0.0),
        ("B", Some(0), 1.5),
        ("it's", Some(1), 0.0),
        ("C d", Some(0), 2.0),
    ];
    check_nodes(&nodes, &truth, &newick);
}

//-----------------------------------------------------------------------------

#[test]
fn wiggle_track() {
    let mut track = WiggleTrack::new(Vec::new());
    assert!(track.start("chr1", 0, 1).is_ok(), "Failed to start a block");
    for value in [0, 1, 2] {
        assert!(track.push(value).is_ok(), "Failed to write value {}", value);
    }
    assert!(track.start("chr2", 99, 10).is_ok(), "Failed to start a block");
    assert!(track.push(7).is_ok(), "Failed to write value 7");
    assert!(track.flush().is_ok(), "Failed to flush the track");
    assert_eq!(track.values(), 4, "Wrong number of values");

    let output = String::from_utf8(track.into_inner()).unwrap();
    let truth = "fixedStep chrom=chr1 start=1 step=1\n0\n1\n2\nfixedStep chrom=chr2 start=100 step=10\n7\n";
    assert_eq!(output, truth, "Wrong wiggle output");
}

//-----------------------------------------------------------------------------
