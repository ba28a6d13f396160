use itertools::Itertools;
use oxrdf::Graph;

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("vcard", "http://www.w3.org/2006/vcard/ns#"),
    ("any23", "http://vocab.sindice.net/any23#"),
];

pub fn serialize_graph(graph: &Graph) -> String {
    let mut output = Vec::new();
    let mut ttl = oxttl::TurtleSerializer::new();
    for (prefix, iri) in PREFIXES {
        ttl = ttl.with_prefix(*prefix, *iri).unwrap();
    }

    let mut ttl = ttl.for_writer(&mut output);
    for triple in graph.iter().sorted_by_cached_key(|t| {
        (
            t.subject.to_string(),
            if t.predicate.as_str() == "http://www.w3.org/1999/02/22-rdf-syntax-ns#type" {
                // make "a" come first
                None
            } else {
                Some(t.predicate.to_string())
            },
            t.object.to_string(),
        )
    }) {
        ttl.serialize_triple(triple).unwrap();
    }

    ttl.finish().unwrap();

    String::from_utf8_lossy(&output).into_owned()
}

#[allow(unused)]
pub fn assert_graph(graph: &Graph, ttl: &str) {
    let mut ttl_graph = Graph::new();
    {
        let ttl_rdf = oxttl::TurtleParser::new().for_slice(ttl.as_bytes());
        for triple in ttl_rdf {
            ttl_graph.insert(&triple.unwrap());
        }
    }

    pretty_assertions::assert_eq!(serialize_graph(graph), serialize_graph(&ttl_graph));
}
