//! Indexed view of the compiler AST.
//!
//! The AST arrives as the solc standard-JSON object graph and is consumed
//! read-only. Indexing extracts the pieces the annotator needs — function and
//! public state-variable declarations (callee resolution), the constructor,
//! and a `"start:length:index"`-keyed handle for every node so that decoded
//! source locations map straight to AST nodes.

use std::sync::Arc;

use alloy_primitives::{hex, Selector};
use foundry_compilers::artifacts::{ast::LowFidelitySourceLocation as SourceLocation, Ast, Node, NodeType};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::source_map::SrcLocation;

/// Resolved type of a declaration, as reported by the compiler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeDesc {
    pub type_string: Option<String>,
    pub type_identifier: Option<String>,
}

/// A formal parameter of a function or getter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDesc {
    pub name: String,
    pub ty: TypeDesc,
}

/// A function definition relevant to callee resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDesc {
    pub id: usize,
    /// Name of the enclosing contract, if any.
    pub contract: Option<String>,
    pub name: String,
    pub is_constructor: bool,
    /// Canonical 4-byte selector; `None` for non-external functions.
    pub selector: Option<Selector>,
    pub params: Vec<ParamDesc>,
    pub src_key: String,
}

/// A public state variable, callable externally through its generated getter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableDesc {
    pub id: usize,
    pub contract: Option<String>,
    pub name: String,
    pub selector: Option<Selector>,
    pub ty: TypeDesc,
    /// Getter argument types: mapping keys outside-in, one `uint256` index
    /// per array dimension.
    pub getter_arg_types: Vec<TypeDesc>,
    pub src_key: String,
}

impl VariableDesc {
    /// The getter's synthesized formals, named `ARG_0..ARG_n`.
    pub fn getter_formals(&self) -> Vec<ParamDesc> {
        self.getter_arg_types
            .iter()
            .enumerate()
            .map(|(i, ty)| ParamDesc { name: format!("ARG_{i}"), ty: ty.clone() })
            .collect()
    }
}

/// The resolved target of a call: a function definition or the generated
/// getter of a public state variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callee {
    Function(Arc<FunctionDesc>),
    Getter(Arc<VariableDesc>),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Self::Function(func) => &func.name,
            Self::Getter(var) => &var.name,
        }
    }

    /// Formal parameters in declaration order.
    pub fn formals(&self) -> Vec<ParamDesc> {
        match self {
            Self::Function(func) => func.params.clone(),
            Self::Getter(var) => var.getter_formals(),
        }
    }
}

/// A non-owning handle to a node in the compiler AST.
#[derive(Clone, Debug, PartialEq)]
pub struct AstNodeHandle {
    pub id: usize,
    pub kind: NodeType,
    /// Canonical `"start:length:index"` span of the node.
    pub src: String,
}

/// Declarations and node handles extracted from all sources of a compilation.
#[derive(Clone, Debug, Default)]
pub struct AstIndex {
    pub functions: Vec<Arc<FunctionDesc>>,
    pub state_variables: Vec<Arc<VariableDesc>>,
    pub constructor: Option<Arc<FunctionDesc>>,
    pub nodes_by_src: FxHashMap<String, AstNodeHandle>,
}

impl AstIndex {
    /// Builds the index over every source unit of a compilation.
    ///
    /// `contract_name` selects which constructor wins when several contracts
    /// in the compilation declare one.
    pub fn from_sources<'a>(
        contract_name: &str,
        asts: impl IntoIterator<Item = &'a Ast>,
    ) -> Self {
        let mut index = Self::default();

        {
            let mut walker = AstWalker { index: &mut index, contract: None };
            for ast in asts {
                for node in &ast.nodes {
                    walker.walk_node(node);
                }
                for value in ast.other.values() {
                    walker.walk_value(value);
                }
            }
        }

        index.constructor = index
            .functions
            .iter()
            .find(|func| func.is_constructor && func.contract.as_deref() == Some(contract_name))
            .or_else(|| index.functions.iter().find(|func| func.is_constructor))
            .cloned();

        index
    }

    /// The AST node spanning exactly the given source location.
    pub fn node_at(&self, src: &SrcLocation) -> Option<&AstNodeHandle> {
        self.nodes_by_src.get(&src.key())
    }

    /// The function or public state variable declared exactly at `src`.
    pub fn callee_at(&self, src: &SrcLocation) -> Option<Callee> {
        let key = src.key();
        if let Some(func) = self.functions.iter().find(|func| func.src_key == key) {
            return Some(Callee::Function(Arc::clone(func)));
        }
        self.state_variables
            .iter()
            .find(|var| var.src_key == key)
            .map(|var| Callee::Getter(Arc::clone(var)))
    }

    /// The function (or getter) matching a msg-data selector. Declared
    /// functions take precedence over state-variable getters.
    pub fn callee_by_selector(&self, selector: Selector) -> Option<Callee> {
        if let Some(func) =
            self.functions.iter().find(|func| func.selector == Some(selector) && !func.is_constructor)
        {
            return Some(Callee::Function(Arc::clone(func)));
        }
        self.state_variables
            .iter()
            .find(|var| var.selector == Some(selector))
            .map(|var| Callee::Getter(Arc::clone(var)))
    }
}

struct AstWalker<'a> {
    index: &'a mut AstIndex,
    contract: Option<String>,
}

impl AstWalker<'_> {
    fn walk_node(&mut self, node: &Node) {
        if let (Some(id), Some(key)) = (node.id, src_key_typed(&node.src)) {
            self.index.nodes_by_src.insert(
                key.clone(),
                AstNodeHandle { id, kind: node.node_type.clone(), src: key.clone() },
            );

            match node.node_type {
                NodeType::ContractDefinition => {
                    let name = node.other.get("name").and_then(Value::as_str).map(str::to_string);
                    let saved = std::mem::replace(&mut self.contract, name);
                    self.walk_children(node);
                    self.contract = saved;
                    return;
                }
                NodeType::FunctionDefinition => {
                    let desc = function_desc(node, id, key, self.contract.clone());
                    self.index.functions.push(Arc::new(desc));
                }
                NodeType::VariableDeclaration => {
                    if let Some(desc) = variable_desc(node, id, key, self.contract.clone()) {
                        self.index.state_variables.push(Arc::new(desc));
                    }
                }
                _ => {}
            }
        }

        self.walk_children(node);
    }

    fn walk_children(&mut self, node: &Node) {
        for child in &node.nodes {
            self.walk_node(child);
        }
        if let Some(body) = &node.body {
            self.walk_node(body);
        }
        for value in node.other.values() {
            self.walk_value(value);
        }
    }

    /// Statements, expressions and type names are not materialized as typed
    /// nodes; they are walked through the raw JSON values.
    fn walk_value(&mut self, value: &Value) {
        match value {
            Value::Object(object) => {
                let id = object.get("id").and_then(Value::as_u64);
                let kind = object.get("nodeType").and_then(Value::as_str);
                let key = object.get("src").and_then(Value::as_str).and_then(src_key_raw);
                if let (Some(id), Some(kind), Some(key)) = (id, kind, key) {
                    if let Ok(kind) =
                        serde_json::from_value::<NodeType>(Value::String(kind.to_string()))
                    {
                        self.index.nodes_by_src.insert(
                            key.clone(),
                            AstNodeHandle { id: id as usize, kind, src: key },
                        );
                    }
                }

                for child in object.values() {
                    self.walk_value(child);
                }
            }
            Value::Array(values) => {
                for child in values {
                    self.walk_value(child);
                }
            }
            _ => {}
        }
    }
}

fn function_desc(
    node: &Node,
    id: usize,
    src_key: String,
    contract: Option<String>,
) -> FunctionDesc {
    let name = node.other.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let kind = node.other.get("kind").and_then(Value::as_str);
    // Legacy ASTs flag constructors with `isConstructor` instead of `kind`.
    let is_constructor = kind == Some("constructor") ||
        node.other.get("isConstructor").and_then(Value::as_bool).unwrap_or(false);
    let selector =
        node.other.get("functionSelector").and_then(Value::as_str).and_then(parse_selector);
    let params = node.other.get("parameters").map(param_list).unwrap_or_default();

    FunctionDesc { id, contract, name, is_constructor, selector, params, src_key }
}

fn variable_desc(
    node: &Node,
    id: usize,
    src_key: String,
    contract: Option<String>,
) -> Option<VariableDesc> {
    if !node.other.get("stateVariable").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    if node.other.get("visibility").and_then(Value::as_str) != Some("public") {
        return None;
    }

    let name = node.other.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let selector =
        node.other.get("functionSelector").and_then(Value::as_str).and_then(parse_selector);

    let mut getter_arg_types = Vec::new();
    if let Some(type_name) = node.other.get("typeName") {
        collect_getter_args(type_name, &mut getter_arg_types);
    }

    Some(VariableDesc {
        id,
        contract,
        name,
        selector,
        ty: type_desc_of_value(node.other.get("typeDescriptions")),
        getter_arg_types,
        src_key,
    })
}

/// Getter arguments implied by a state variable's type: one key per mapping
/// level (outside-in) and one `uint256` index per array dimension.
fn collect_getter_args(type_name: &Value, out: &mut Vec<TypeDesc>) {
    match type_name.get("nodeType").and_then(Value::as_str) {
        Some("Mapping") => {
            out.push(type_desc_of_value(
                type_name.get("keyType").and_then(|key| key.get("typeDescriptions")),
            ));
            if let Some(value_type) = type_name.get("valueType") {
                collect_getter_args(value_type, out);
            }
        }
        Some("ArrayTypeName") => {
            out.push(TypeDesc {
                type_string: Some("uint256".to_string()),
                type_identifier: Some("t_uint256".to_string()),
            });
            if let Some(base_type) = type_name.get("baseType") {
                collect_getter_args(base_type, out);
            }
        }
        _ => {}
    }
}

fn param_list(value: &Value) -> Vec<ParamDesc> {
    value
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .map(|param| ParamDesc {
                    name: param.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    ty: type_desc_of_value(param.get("typeDescriptions")),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn type_desc_of_value(type_descriptions: Option<&Value>) -> TypeDesc {
    let get = |key: &str| {
        type_descriptions.and_then(|value| value.get(key)).and_then(Value::as_str).map(str::to_string)
    };
    TypeDesc { type_string: get("typeString"), type_identifier: get("typeIdentifier") }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    let bytes = hex::decode(selector).ok()?;
    (bytes.len() == 4).then(|| Selector::from_slice(&bytes))
}

fn src_key_typed(src: &SourceLocation) -> Option<String> {
    let start = src.start;
    let length = src.length?;
    match src.index {
        Some(index) => Some(format!("{start}:{length}:{index}")),
        None => Some(format!("{start}:{length}:-1")),
    }
}

fn src_key_raw(src: &str) -> Option<String> {
    let mut parts = src.split(':');
    let start: i64 = parts.next()?.parse().ok()?;
    let length: i64 = parts.next()?.parse().ok()?;
    let index: i64 = parts.next()?.parse().ok()?;
    if start < 0 || length < 0 {
        return None;
    }
    Some(format!("{start}:{length}:{index}"))
}

#[cfg(test)]
mod tests {
    use foundry_compilers::artifacts::sourcemap::Jump;
    use serde_json::json;

    use super::*;

    fn counter_ast() -> Ast {
        serde_json::from_value(json!({
            "absolutePath": "Counter.sol",
            "id": 0,
            "nodeType": "SourceUnit",
            "src": "0:200:0",
            "nodes": [{
                "id": 1,
                "nodeType": "ContractDefinition",
                "src": "0:190:0",
                "name": "Counter",
                "nodes": [
                    {
                        "id": 2,
                        "nodeType": "FunctionDefinition",
                        "src": "10:40:0",
                        "name": "inc",
                        "kind": "function",
                        "visibility": "public",
                        "functionSelector": "371303c0",
                        "parameters": {
                            "id": 3,
                            "nodeType": "ParameterList",
                            "src": "22:9:0",
                            "parameters": [{
                                "id": 4,
                                "nodeType": "VariableDeclaration",
                                "src": "23:7:0",
                                "name": "by",
                                "stateVariable": false,
                                "storageLocation": "default",
                                "typeDescriptions": {
                                    "typeString": "uint256",
                                    "typeIdentifier": "t_uint256"
                                }
                            }]
                        },
                        "body": {
                            "id": 5,
                            "nodeType": "Block",
                            "src": "35:15:0",
                            "statements": [{
                                "id": 6,
                                "nodeType": "ExpressionStatement",
                                "src": "40:5:0",
                                "expression": {}
                            }]
                        }
                    },
                    {
                        "id": 7,
                        "nodeType": "VariableDeclaration",
                        "src": "60:40:0",
                        "name": "balances",
                        "stateVariable": true,
                        "visibility": "public",
                        "functionSelector": "27e235e3",
                        "typeDescriptions": {
                            "typeString": "mapping(address => uint256)",
                            "typeIdentifier": "t_mapping$_t_address_$_t_uint256_$"
                        },
                        "typeName": {
                            "id": 8,
                            "nodeType": "Mapping",
                            "src": "60:27:0",
                            "keyType": {
                                "id": 9,
                                "nodeType": "ElementaryTypeName",
                                "src": "68:7:0",
                                "name": "address",
                                "typeDescriptions": {
                                    "typeString": "address",
                                    "typeIdentifier": "t_address"
                                }
                            },
                            "valueType": {
                                "id": 10,
                                "nodeType": "ElementaryTypeName",
                                "src": "79:7:0",
                                "name": "uint256",
                                "typeDescriptions": {
                                    "typeString": "uint256",
                                    "typeIdentifier": "t_uint256"
                                }
                            }
                        }
                    },
                    {
                        "id": 11,
                        "nodeType": "FunctionDefinition",
                        "src": "110:30:0",
                        "name": "",
                        "kind": "constructor",
                        "visibility": "public",
                        "parameters": { "id": 12, "nodeType": "ParameterList", "src": "121:2:0", "parameters": [] }
                    }
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_index_declarations() {
        let ast = counter_ast();
        let index = AstIndex::from_sources("Counter", [&ast]);

        assert_eq!(index.functions.len(), 2);
        let inc = &index.functions[0];
        assert_eq!(inc.name, "inc");
        assert_eq!(inc.contract.as_deref(), Some("Counter"));
        assert_eq!(inc.selector, Some(Selector::from_slice(&[0x37, 0x13, 0x03, 0xc0])));
        assert_eq!(inc.params.len(), 1);
        assert_eq!(inc.params[0].name, "by");
        assert_eq!(inc.params[0].ty.type_identifier.as_deref(), Some("t_uint256"));

        let constructor = index.constructor.as_ref().expect("constructor indexed");
        assert!(constructor.is_constructor);
        assert_eq!(constructor.src_key, "110:30:0");

        assert_eq!(index.state_variables.len(), 1);
        let balances = &index.state_variables[0];
        assert_eq!(balances.name, "balances");
        let formals = balances.getter_formals();
        assert_eq!(formals.len(), 1);
        assert_eq!(formals[0].name, "ARG_0");
        assert_eq!(formals[0].ty.type_identifier.as_deref(), Some("t_address"));
    }

    #[test]
    fn test_selector_and_src_lookup() {
        let ast = counter_ast();
        let index = AstIndex::from_sources("Counter", [&ast]);

        let inc_src =
            SrcLocation { start: 10, length: 40, index: Some(0), jump: Jump::Regular };
        let handle = index.node_at(&inc_src).expect("node at function span");
        assert_eq!(handle.id, 2);
        assert!(matches!(handle.kind, NodeType::FunctionDefinition));

        match index.callee_at(&inc_src) {
            Some(Callee::Function(func)) => assert_eq!(func.name, "inc"),
            other => panic!("unexpected callee: {other:?}"),
        }

        let getter_sel = Selector::from_slice(&[0x27, 0xe2, 0x35, 0xe3]);
        match index.callee_by_selector(getter_sel) {
            Some(Callee::Getter(var)) => assert_eq!(var.name, "balances"),
            other => panic!("unexpected callee: {other:?}"),
        }

        // Statements are reachable through the src-keyed handle map too.
        let stmt_src = SrcLocation { start: 40, length: 5, index: Some(0), jump: Jump::Regular };
        assert!(index.node_at(&stmt_src).is_some());
    }
}
