// validate.rs — Template interface checks
//
// Compares the slots a template declares with the catalog entry of its
// module type. Every mismatch is reported as data; nothing here fails, the
// caller decides whether an invalid template blocks a conversion.
//
// Preconditions: none.
// Postconditions: `errors` is empty iff inlet, outlet and parameter counts
//                 (and jack rates) equal the catalog's.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::catalog::{Catalog, PortRate};
use crate::diag::{codes, Diagnostic};
use crate::template::{SlotKind, Template};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The catalog has no entry for the template's type.
    UnknownType { type_id: u32 },
    MissingDirective { kind: SlotKind },
    Arity {
        kind: SlotKind,
        expected: usize,
        found: usize,
    },
    Rate {
        kind: SlotKind,
        index: usize,
        expected: PortRate,
        found: PortRate,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownType { type_id } => {
                write!(f, "module type {type_id} is not in the catalog")
            }
            ValidationError::MissingDirective { kind } => {
                write!(f, "missing ';@ {kind}' directive")
            }
            ValidationError::Arity {
                kind,
                expected,
                found,
            } => write!(f, "'{kind}' declares {found} slots, module has {expected}"),
            ValidationError::Rate {
                kind,
                index,
                expected,
                found,
            } => write!(
                f,
                "'{kind}' slot {index} is {found}-rate, module jack is {expected}-rate"
            ),
        }
    }
}

impl ValidationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            ValidationError::UnknownType { .. } => codes::E0200,
            ValidationError::MissingDirective { .. } => codes::E0201,
            ValidationError::Arity { .. } => codes::E0202,
            ValidationError::Rate { .. } => codes::E0203,
        };
        Diagnostic::error(self.to_string()).with_code(code)
    }
}

/// Outcome of checking one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValidation {
    pub type_id: u32,
    pub errors: Vec<ValidationError>,
}

impl TemplateValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(ValidationError::to_diagnostic).collect()
    }
}

pub fn validate(catalog: &Catalog, template: &Template) -> TemplateValidation {
    let mut errors = Vec::new();
    match catalog.lookup(template.type_id) {
        None => errors.push(ValidationError::UnknownType {
            type_id: template.type_id,
        }),
        Some(spec) => {
            check_ports(&mut errors, SlotKind::Inlets, template.inlets.as_deref(), &spec.inlets);
            check_ports(&mut errors, SlotKind::Outlets, template.outlets.as_deref(), &spec.outlets);
            match &template.args {
                None => errors.push(ValidationError::MissingDirective {
                    kind: SlotKind::Args,
                }),
                Some(args) if args.len() != spec.params => errors.push(ValidationError::Arity {
                    kind: SlotKind::Args,
                    expected: spec.params,
                    found: args.len(),
                }),
                Some(_) => {}
            }
        }
    }
    TemplateValidation {
        type_id: template.type_id,
        errors,
    }
}

fn check_ports(
    errors: &mut Vec<ValidationError>,
    kind: SlotKind,
    declared: Option<&[PortRate]>,
    expected: &[PortRate],
) {
    let Some(declared) = declared else {
        errors.push(ValidationError::MissingDirective { kind });
        return;
    };
    if declared.len() != expected.len() {
        errors.push(ValidationError::Arity {
            kind,
            expected: expected.len(),
            found: declared.len(),
        });
        return;
    }
    for (index, (found, want)) in declared.iter().zip(expected).enumerate() {
        if found != want {
            errors.push(ValidationError::Rate {
                kind,
                index,
                expected: *want,
                found: *found,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleSpec;
    use PortRate::{Audio, Control};

    fn catalog() -> Catalog {
        Catalog::from_specs([ModuleSpec {
            id: 92,
            name: "FltLP".into(),
            inlets: vec![Control, Audio, Audio],
            outlets: vec![Audio],
            params: 2,
        }])
        .unwrap()
    }

    fn check(text: &str) -> TemplateValidation {
        let template = Template::parse(92, text, "t").unwrap();
        validate(&catalog(), &template)
    }

    #[test]
    fn matching_template_is_valid() {
        let v = check(";@ args k k\n;@ ins k a a\n;@ outs a\n");
        assert!(v.is_valid());
        assert!(v.diagnostics().is_empty());
    }

    #[test]
    fn one_missing_inlet_is_one_error() {
        let v = check(";@ args k k\n;@ ins k a\n;@ outs a\n");
        assert!(!v.is_valid());
        assert_eq!(
            v.errors,
            vec![ValidationError::Arity {
                kind: SlotKind::Inlets,
                expected: 3,
                found: 2,
            }]
        );
    }

    #[test]
    fn every_mismatch_is_reported() {
        let v = check(";@ ins a a a\n;@ outs a a\n;@ args k k k\n");
        assert_eq!(
            v.errors,
            vec![
                ValidationError::Rate {
                    kind: SlotKind::Inlets,
                    index: 0,
                    expected: Control,
                    found: Audio,
                },
                ValidationError::Arity {
                    kind: SlotKind::Outlets,
                    expected: 1,
                    found: 2,
                },
                ValidationError::Arity {
                    kind: SlotKind::Args,
                    expected: 2,
                    found: 3,
                },
            ]
        );
    }

    #[test]
    fn missing_directives_are_errors() {
        let v = check("a1 = 0\n");
        assert_eq!(v.errors.len(), 3);
        assert!(v
            .errors
            .iter()
            .all(|e| matches!(e, ValidationError::MissingDirective { .. })));
        assert_eq!(v.errors[0].to_string(), "missing ';@ ins' directive");
    }

    #[test]
    fn unknown_type_is_a_single_error() {
        let template = Template::parse(5, ";@ ins\n;@ outs\n;@ args\n", "t").unwrap();
        let v = validate(&catalog(), &template);
        assert_eq!(v.errors, vec![ValidationError::UnknownType { type_id: 5 }]);
        assert_eq!(
            v.diagnostics()[0].to_string(),
            "error[E0200]: module type 5 is not in the catalog"
        );
    }

    #[test]
    fn messages_name_the_slot_group() {
        let v = check(";@ args k k\n;@ ins k a\n;@ outs k\n");
        let messages: Vec<String> = v.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "'ins' declares 2 slots, module has 3",
                "'outs' slot 0 is k-rate, module jack is a-rate",
            ]
        );
    }
}
