/// Tests for the embedded interpreter as seen through `exec` and `eval`.
use graft::{BridgeConfig, BridgeError, ExcType, LimitError, ParseError, Session, Value};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Result<Value, BridgeError> {
    let mut session = Session::default();
    let scope = session.create_scope();
    session.eval(source, &scope)
}

fn run(source: &str, name: &str) -> Value {
    let mut session = Session::default();
    let scope = session.create_scope();
    session.exec(source, &scope).unwrap();
    session.scope_get(&scope, name).unwrap()
}

#[test]
fn unsupported_construct_reports_location() {
    let mut session = Session::new(BridgeConfig::new().script_name("setup.py"));
    let scope = session.create_scope();
    let err = session.exec("x = 1\nwhile x:\n  pass\n", &scope).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::SyntaxError);
    let BridgeError::Parse(ParseError::NotSupported { construct, location }) = &err else {
        panic!("expected NotSupported, got {err}");
    };
    assert_eq!(construct, "`while` loops");
    assert_eq!((location.filename.as_str(), location.line, location.column), ("setup.py", 2, 1));
}

#[test]
fn invalid_source_is_a_syntax_error() {
    let err = eval("1 +").unwrap_err();
    assert!(matches!(err, BridgeError::Parse(ParseError::Syntax { .. })), "{err}");
}

#[test]
fn builtin_functions() {
    assert_eq!(eval("isinstance(True, int)").unwrap(), Value::Bool(true));
    assert_eq!(eval("isinstance('a', [int, str])").unwrap(), Value::Bool(true));
    assert_eq!(eval("issubclass(bool, object)").unwrap(), Value::Bool(true));
    assert_eq!(eval("len([1, 2, 3]) + len('ab')").unwrap(), Value::Int(5));
    assert_eq!(eval("repr('it')").unwrap(), Value::from("'it'"));
    assert_eq!(eval("hasattr(1, 'nope')").unwrap(), Value::Bool(false));
    assert_eq!(eval("getattr(1, 'nope', 'fallback')").unwrap(), Value::from("fallback"));
    assert_eq!(eval("int('42') - 2").unwrap(), Value::Int(40));
}

#[test]
fn self_containing_classinfo_hits_the_recursion_limit() {
    let mut session = Session::new(BridgeConfig::new().max_recursion_depth(50));
    let scope = session.create_scope();
    session.exec("l = [str]\nl[0] = l", &scope).unwrap();

    for source in ["isinstance(1, l)", "issubclass(bool, l)"] {
        let err = session.eval(source, &scope).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::RecursionError, "{source}");
        assert!(
            matches!(err, BridgeError::Limit(LimitError::Recursion { limit: 50, depth: 51 })),
            "{source}: {err}"
        );
    }
    assert_eq!(session.eval("isinstance(1, [str, int])", &scope).unwrap(), Value::Bool(true));
}

#[test]
fn unknown_name_is_name_error() {
    let err = eval("undefined").unwrap_err();
    assert_eq!(err.to_string(), "NameError: name 'undefined' is not defined");
}

#[test]
fn unknown_module_is_import_error() {
    let mut session = Session::default();
    let scope = session.create_scope();
    let err = session.exec("from nowhere import Thing", &scope).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ImportError);
    assert_eq!(err.to_string(), "ImportError: No module named 'nowhere'");
}

#[test]
fn raised_exception_crosses_the_boundary() {
    let mut session = Session::default();
    let scope = session.create_scope();
    let err = session.exec("raise ValueError('bad input')", &scope).unwrap_err();
    let BridgeError::Call(exc) = err else {
        panic!("expected a raised exception, got {err}");
    };
    assert_eq!(exc.exc_type(), ExcType::ValueError);
    assert_eq!(exc.message(), Some("bad input"));

    let err = session.exec("raise", &scope).unwrap_err();
    assert_eq!(err.to_string(), "RuntimeError: No active exception to reraise");

    assert_eq!(
        session.eval("isinstance(KeyError('k'), Exception)", &scope).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn function_arity_errors() {
    let mut session = Session::default();
    let scope = session.create_scope();
    session.exec("def pair(a, b):\n  return [a, b]", &scope).unwrap();

    let err = session.eval("pair(1)", &scope).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: pair() missing 1 required positional argument: 'b'"
    );
    let err = session.eval("pair(1, 2, 3)", &scope).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: pair() takes 2 positional arguments but 3 were given"
    );
}

#[test]
fn calling_a_non_callable() {
    let err = eval("3(1)").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: 'int' object is not callable");
}

#[test]
fn integer_overflow_is_reported() {
    let err = eval("9223372036854775807 + 1").unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);
}

#[test]
fn containers_and_conditionals() {
    let source = "\
d = {'a': 1}
d['b'] = 2
items = [d['a'], d['b']]
if 'b' in d and len(items) == 2:
  result = items[-1] * 10
else:
  result = 0
";
    assert_eq!(run(source, "result"), Value::Int(20));
}

#[test]
fn getattr_hook_runs_only_on_miss() {
    let source = "\
class Lazy:
  def __init__(self):
    self.real = 'stored'
  def __getattr__(self, name):
    return 'computed ' + name
obj = Lazy()
result = [obj.real, obj.other]
";
    let mut session = Session::default();
    let scope = session.create_scope();
    session.exec(source, &scope).unwrap();
    assert_eq!(
        session.eval("result[0] + ', ' + result[1]", &scope).unwrap(),
        Value::from("stored, computed other")
    );
}

#[test]
fn setattr_hook_can_delegate_to_object() {
    let source = "\
class Upper:
  def __setattr__(self, name, value):
    object.__setattr__(self, name, value + '!')
u = Upper()
u.greeting = 'hi'
result = u.greeting
";
    assert_eq!(run(source, "result"), Value::from("hi!"));
}

#[test]
fn invoke_method_distinguishes_missing_methods() {
    let mut session = Session::default();
    let scope = session.create_scope();
    session
        .exec("class Greeter:\n  def hello(self, who):\n    return 'hello ' + who\ng = Greeter()", &scope)
        .unwrap();
    let g = session.scope_get(&scope, "g").unwrap();

    let greeting = session.invoke_method(&g, "hello", vec![Value::from("there")]).unwrap();
    assert_eq!(greeting, Value::from("hello there"));

    let err = session.invoke_method(&g, "goodbye", vec![]).unwrap_err();
    assert!(
        matches!(err, BridgeError::NoSuchMethod { ref type_name, ref method } if type_name == "Greeter" && method == "goodbye"),
        "unexpected error: {err}"
    );
    assert!(err.is_attribute_error());
}

#[test]
fn explicit_super_outside_a_method() {
    let mut session = Session::default();
    let scope = session.create_scope();
    session
        .exec(
            "class A:\n  def name(self):\n    return 'A'\nclass B(A):\n  def name(self):\n    return 'B'\nb = B()",
            &scope,
        )
        .unwrap();
    assert_eq!(session.eval("super(B, b).name()", &scope).unwrap(), Value::from("A"));

    let b = session.scope_get(&scope, "b").unwrap();
    let b_class = session.class_of(&b);
    let name = session.get_super_attr(&b, b_class, "name").unwrap();
    assert_eq!(session.call(&name, vec![]).unwrap(), Value::from("A"));

    let err = session.get_super_attr(&b, b_class, "missing").unwrap_err();
    assert!(matches!(err, BridgeError::AttributeNotFound { ref type_name, .. } if type_name == "super"));
}
