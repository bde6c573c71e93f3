//! Unit tests for ExcKind and ExceptionObject

use core_types::{ExcKind, ExceptionObject, TracebackEntry, Value};

#[cfg(test)]
mod exc_kind_tests {
    use super::*;

    #[test]
    fn test_lookup_errors_share_a_base() {
        assert!(ExcKind::IndexError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(!ExcKind::IndexError.is_subclass_of(ExcKind::KeyError));
    }

    #[test]
    fn test_unbound_local_is_a_name_error() {
        assert!(ExcKind::UnboundLocalError.is_subclass_of(ExcKind::NameError));
        assert_eq!(ExcKind::UnboundLocalError.parent(), Some(ExcKind::NameError));
    }

    #[test]
    fn test_recursion_error_is_a_runtime_error() {
        assert!(ExcKind::RecursionError.is_subclass_of(ExcKind::RuntimeError));
        assert!(ExcKind::RecursionError.is_subclass_of(ExcKind::Exception));
    }

    #[test]
    fn test_base_exception_has_no_parent() {
        assert_eq!(ExcKind::BaseException.parent(), None);
    }

    #[test]
    fn test_kind_display_is_class_name() {
        assert_eq!(ExcKind::ZeroDivisionError.to_string(), "ZeroDivisionError");
        assert_eq!(ExcKind::GeneratorExit.name(), "GeneratorExit");
    }
}

#[cfg(test)]
mod exception_object_tests {
    use super::*;

    #[test]
    fn test_generator_exit_escapes_exception_handlers() {
        let sentinel = ExceptionObject::new(ExcKind::GeneratorExit, vec![]);
        assert!(!sentinel.matches(ExcKind::Exception));
        assert!(sentinel.matches(ExcKind::BaseException));
        assert!(sentinel.matches(ExcKind::GeneratorExit));
    }

    #[test]
    fn test_message_from_args() {
        let none = ExceptionObject::new(ExcKind::ValueError, vec![]);
        assert_eq!(none.message(), "");

        let one = ExceptionObject::new(ExcKind::ValueError, vec![Value::Int(3)]);
        assert_eq!(one.message(), "3");

        let two = ExceptionObject::new(ExcKind::ValueError, vec![Value::Int(3), Value::from("x")]);
        assert_eq!(two.message(), "3, x");
    }

    #[test]
    fn test_args_are_preserved() {
        let error = ExceptionObject::with_message(ExcKind::KeyError, "missing");
        assert_eq!(error.args(), &[Value::from("missing")]);
        assert_eq!(error.kind(), ExcKind::KeyError);
    }

    #[test]
    fn test_traceback_entries_keep_frames() {
        let error = ExceptionObject::new(ExcKind::RuntimeError, vec![]);
        error.push_traceback(TracebackEntry {
            frame: Value::from("frame-a"),
            line: 10,
        });
        let tb = error.traceback();
        assert_eq!(tb.len(), 1);
        assert_eq!(tb[0].frame, Value::from("frame-a"));
        assert_eq!(tb[0].line, 10);
    }
}
