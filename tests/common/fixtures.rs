use metaschema::SimpleNode;

/// A small control catalog: two groups, three controls with typed weights,
/// links between controls, and one control without an id.
pub fn catalog() -> SimpleNode {
    SimpleNode::document()
        .uri("file:///data/catalog.json")
        .child(
            SimpleNode::assembly("catalog")
                .flag("uuid", "ID-100")
                .child(SimpleNode::field("title", "Security Controls"))
                .child(
                    SimpleNode::assembly("group")
                        .flag("id", "ac")
                        .child(control("ac-1", "1.5", "Policy").child(link("#ac-2")))
                        .child(control("ac-2", "2.25", "Account Management").child(link("#au-9"))),
                )
                .child(
                    SimpleNode::assembly("group")
                        .flag("id", "au")
                        .child(control("au-1", "0.25", "Audit Policy"))
                        .child(SimpleNode::assembly("control").child(SimpleNode::field("title", "Draft"))),
                ),
        )
        .build()
}

fn control(id: &str, weight: &str, title: &str) -> metaschema::node::NodeBuilder {
    SimpleNode::assembly("control")
        .flag("id", id)
        .typed_flag("weight", weight, "decimal")
        .child(SimpleNode::field("title", title))
}

fn link(href: &str) -> metaschema::node::NodeBuilder {
    SimpleNode::assembly("link").flag("href", href)
}

/// Parties keyed by `uuid` flags of the form `ID-<n>`, one of them a
/// duplicate and one without any key.
pub fn parties() -> SimpleNode {
    SimpleNode::document()
        .child(
            SimpleNode::assembly("metadata")
                .child(party(Some("ID-1"), "Ada"))
                .child(party(Some("ID-2"), "Grace"))
                .child(party(Some("ID-1"), "Ada (again)"))
                .child(party(None, "Anonymous"))
                .child(party(Some("bogus"), "Mallory")),
        )
        .build()
}

fn party(uuid: Option<&str>, name: &str) -> metaschema::node::NodeBuilder {
    let party = SimpleNode::assembly("party");
    let party = match uuid {
        Some(uuid) => party.flag("uuid", uuid),
        None => party,
    };
    party.child(SimpleNode::field("name", name))
}
