/// Per-language grammar bindings and tree-sitter queries.
///
/// Each supported language carries its own grammar plus the S-expression
/// queries the chunker and extractors compile against it. Query node shapes
/// are grammar-specific and must never be shared across languages.
use tree_sitter::Language as TsLanguage;

use crate::language::Language;

pub struct LanguageSpec {
    pub grammar: TsLanguage,
    /// Captures semantic units: @function / @class / @method (+ @name).
    pub definition_query: &'static str,
    pub call_query: &'static str,
    pub import_query: &'static str,
    pub inherit_query: &'static str,
    /// Node kinds counted toward cyclomatic complexity.
    pub branch_kinds: &'static [&'static str],
}

impl LanguageSpec {
    pub fn get(language: Language) -> LanguageSpec {
        match language {
            Language::Python => python_spec(),
            Language::Rust => rust_spec(),
            Language::Go => go_spec(),
            Language::TypeScript => typescript_spec(),
            Language::JavaScript => javascript_spec(),
        }
    }
}

fn python_spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_python::LANGUAGE.into(),
        definition_query: r#"
(function_definition
  name: (identifier) @name) @function

(class_definition
  name: (identifier) @name) @class
"#,
        call_query: r#"
(call
  function: (identifier) @call)
(call
  function: (attribute
    attribute: (identifier) @call))
"#,
        import_query: r#"
(import_statement
  name: (dotted_name) @import.module)
(import_from_statement
  module_name: (dotted_name) @import.module
  name: (dotted_name) @import.name)
"#,
        inherit_query: r#"
(class_definition
  superclasses: (argument_list
    (identifier) @inherit))
"#,
        branch_kinds: &[
            "if_statement",
            "elif_clause",
            "for_statement",
            "while_statement",
            "try_statement",
            "except_clause",
            "conditional_expression",
            "boolean_operator",
        ],
    }
}

fn rust_spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_rust::LANGUAGE.into(),
        definition_query: r#"
(function_item
  name: (identifier) @name) @function

(struct_item
  name: (type_identifier) @name) @class

(enum_item
  name: (type_identifier) @name) @class

(trait_item
  name: (type_identifier) @name) @class
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (field_expression
    field: (field_identifier) @call))
(call_expression
  function: (scoped_identifier
    name: (identifier) @call))
"#,
        import_query: r#"
(use_declaration
  argument: (scoped_identifier) @import.module)
(use_declaration
  argument: (identifier) @import.module)
"#,
        inherit_query: "",
        branch_kinds: &[
            "if_expression",
            "match_arm",
            "while_expression",
            "loop_expression",
            "for_expression",
        ],
    }
}

fn go_spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_go::LANGUAGE.into(),
        definition_query: r#"
(function_declaration
  name: (identifier) @name) @function

(method_declaration
  name: (field_identifier) @name) @method

(type_declaration
  (type_spec
    name: (type_identifier) @name
    type: (struct_type))) @class

(type_declaration
  (type_spec
    name: (type_identifier) @name
    type: (interface_type))) @class
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (selector_expression
    field: (field_identifier) @call))
"#,
        import_query: r#"
(import_spec
  path: (interpreted_string_literal) @import.module)
"#,
        inherit_query: "",
        branch_kinds: &[
            "if_statement",
            "for_statement",
            "expression_switch_statement",
            "type_switch_statement",
            "select_statement",
        ],
    }
}

fn typescript_spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        definition_query: r#"
(function_declaration
  name: (identifier) @name) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(class_declaration
  name: (type_identifier) @name) @class

(interface_declaration
  name: (type_identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
"#,
        import_query: r#"
(import_statement
  (import_clause
    (named_imports
      (import_specifier
        name: (identifier) @import.name)))
  source: (string) @import.module)
(import_statement
  source: (string) @import.module)
"#,
        inherit_query: r#"
(class_declaration
  (class_heritage
    (extends_clause
      value: (identifier) @inherit)))
(class_declaration
  (class_heritage
    (implements_clause
      (type_identifier) @inherit)))
"#,
        branch_kinds: &[
            "if_statement",
            "for_statement",
            "for_in_statement",
            "while_statement",
            "do_statement",
            "switch_case",
            "ternary_expression",
            "catch_clause",
        ],
    }
}

fn javascript_spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_javascript::LANGUAGE.into(),
        definition_query: r#"
(function_declaration
  name: (identifier) @name) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(class_declaration
  name: (identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
"#,
        import_query: r#"
(import_statement
  (import_clause
    (named_imports
      (import_specifier
        name: (identifier) @import.name)))
  source: (string) @import.module)
(import_statement
  source: (string) @import.module)
"#,
        inherit_query: r#"
(class_declaration
  (class_heritage
    (identifier) @inherit))
"#,
        branch_kinds: &[
            "if_statement",
            "for_statement",
            "for_in_statement",
            "while_statement",
            "do_statement",
            "switch_case",
            "ternary_expression",
            "catch_clause",
        ],
    }
}
