//! Integration tests for classification, cloning and edge redirection.

use bumpalo::Bump;
use offload_ipa::text_ir::{FuncRef, Module};
use offload_ipa::{
    Attribute, CallGraph, FunctionKind, OffloadPass, PassOptions, PassSession, Severity,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn parse(text: &str) -> Module {
    Module::parse(text).unwrap_or_else(|e| panic!("Failed to parse module: {e}"))
}

fn node(module: &Module, name: &str) -> FuncRef {
    module
        .node_by_name(name)
        .unwrap_or_else(|| panic!("No function named {name}"))
}

fn offload() -> PassOptions {
    PassOptions::new().offload_requested(true)
}

const PROGRAM: &str = r#"
; Target region outlined into a kernel
vec_add(%a, %b) [hsa_kernel] {
entry:
  %x = call @helper(%a)
  %y = call @scale(%b)
  call @host_only()
  ret
}

helper(%x) ["omp declare target"] local {
entry:
  %y = call @scale(%x)
  ret %y
}

scale(%x) [hsa_function] {
entry:
  %y = mul %x, 2
  ret %y
}

host_only() { entry: ret }

main() {
entry:
  call @helper(1)
  ret
}
"#;

#[test]
fn test_gate_follows_request() {
    let pass: OffloadPass<Module> = OffloadPass::new(PassOptions::new());
    assert!(!pass.gate());
    let pass: OffloadPass<Module> = OffloadPass::new(offload());
    assert!(pass.gate());
}

#[test]
fn test_explicit_kernel_is_not_cloned() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    let k = node(&module, "vec_add");
    let s = pass.summaries().unwrap().get(k);
    assert_eq!(s.kind, FunctionKind::Kernel);
    assert!(s.is_accelerator_implementation);
    assert_eq!(s.bound_function, None);
    assert!(module.node_by_name("vec_add.hsa.0").is_none());
    assert!(!report.clones.iter().any(|&c| module.name(c).starts_with("vec_add")));
}

#[test]
fn test_explicit_function_gets_one_linked_clone() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    pass.execute(&mut module, &session);

    let scale = node(&module, "scale");
    let clone = node(&module, "scale.hsa.0");
    let summaries = pass.summaries().unwrap();

    let host = summaries.get(scale);
    assert_eq!(host.kind, FunctionKind::Function);
    assert!(!host.is_accelerator_implementation);
    assert_eq!(host.bound_function, Some(clone));

    let accel = summaries.get(clone);
    assert_eq!(accel.kind, FunctionKind::Function);
    assert!(accel.is_accelerator_implementation);

    // scale is not local, so its clone must be emitted
    assert!(module.node_flags(clone).force_output);
    assert!(module.decl_flags(clone).public);
    assert!(module.node_flags(clone).externally_visible);
    assert!(module.node_by_name("scale.hsa.1").is_none());
}

#[test]
fn test_implicit_callable_clone_of_local_function() {
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    pass.execute(&mut module, &session);

    let helper = node(&module, "helper");
    let clone = node(&module, "helper.hsa.0");
    let summaries = pass.summaries().unwrap();

    assert_eq!(summaries.get(helper).kind, FunctionKind::Kernel);
    assert_eq!(summaries.get(helper).bound_function, Some(clone));
    assert!(summaries.get(clone).is_accelerator_implementation);

    // helper is local, so nothing forces its clone out
    assert!(!module.node_flags(clone).force_output);
    assert!(!module.decl_flags(clone).public);
}

#[test]
fn test_accelerator_edges_point_at_clones() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    let k = node(&module, "vec_add");
    assert_eq!(
        module.callee_names(k),
        vec!["helper.hsa.0", "scale.hsa.0", "host_only"]
    );
    assert_eq!(
        module.callee_names(node(&module, "helper.hsa.0")),
        vec!["scale.hsa.0"]
    );

    // Host callers are untouched
    assert_eq!(module.callee_names(node(&module, "helper")), vec!["scale"]);
    assert_eq!(module.callee_names(node(&module, "main")), vec!["helper"]);

    assert_eq!(report.redirected, 3);
    assert_eq!(session.stats().edges_redirected, 3);
}

#[test]
fn test_second_execution_changes_nothing() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let first = pass.execute(&mut module, &session);
    let graph_after_first = module.print();
    let summaries_after_first = pass.dump(&module);

    let second = pass.execute(&mut module, &session);

    assert_eq!(first.clones.len(), 2);
    assert!(second.clones.is_empty());
    assert_eq!(second.redirected, 0);
    assert_eq!(module.print(), graph_after_first);
    assert_eq!(pass.dump(&module), summaries_after_first);
}

#[test]
fn test_placeholder_is_made_public() {
    let mut module = parse(
        r#"
ph(%x) [hsa_placeholder] local !
k(%x) [hsa_kernel] {
entry:
  %r = call @ph(%x) throws
  ret
}
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    let ph = node(&module, "ph");
    assert!(module.decl_flags(ph).public);
    assert!(report.clones.is_empty());
    assert!(!pass.summaries().unwrap().get(ph).is_participant());
}

#[test]
fn test_unversionable_function_warns() {
    let mut module = parse(
        r#"
pinned() [hsa_function] noclone { entry: ret }
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    assert!(report.clones.is_empty());
    let diags = session.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].severity, Severity::Warning);
    assert_eq!(
        diags[0].message,
        "could not emit HSAIL for function pinned: function cannot be cloned"
    );

    // The warning is optional
    let mut module = parse("pinned() [hsa_function] noclone { entry: ret }");
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload().warn_offload(false));
    pass.execute(&mut module, &session);
    assert!(session.diagnostics().is_empty());
}

#[test]
fn test_artificial_and_openacc_functions_stay_host_only() {
    let mut module = parse(
        r#"
synth() ["omp declare target"] artificial { entry: ret }
acc() ["omp declare target", "oacc function"] { entry: ret }
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    assert!(report.clones.is_empty());
    assert_eq!(module.functions().count(), 2);
}

#[test]
fn test_parallel_offload_clones_universal_functions() {
    init_logging();
    let mut module = parse(
        r#"
square(%x) local {
entry:
  %y = mul %x, %x
  ret %y
}
thrower() !
risky() {
entry:
  call @thrower() throws
  ret
}
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload().parallel_offload(true).verbose(true));

    let report = pass.execute(&mut module, &session);

    let square = node(&module, "square");
    assert!(module.has_attribute(square, Attribute::HsaUniversal));
    assert!(module.has_attribute(square, Attribute::OmpDeclareTarget));

    let clone = node(&module, "square.hsa.0");
    assert_eq!(report.clones, vec![clone]);
    // Universal clones get program-wide linkage in this mode
    assert!(module.decl_flags(clone).public);
    assert!(!module.node_flags(clone).force_output);
    assert_eq!(pass.summaries().unwrap().get(square).kind, FunctionKind::Function);

    assert!(module.node_by_name("risky.hsa.0").is_none());
    assert_eq!(session.diagnostics().len(), 1);
}

#[test]
fn test_rejected_kernel_is_dropped_in_parallel_mode() {
    let mut module = parse(
        r#"
k(%p) [hsa_kernel] {
entry:
  call_indirect %p()
  ret
}
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let k = node(&module, "k");
    let mut pass = OffloadPass::new(offload().parallel_offload(true));

    let report = pass.execute(&mut module, &session);

    assert_eq!(report.removed, vec![k]);
    assert_eq!(module.functions().count(), 0);
    assert!(pass.summaries().unwrap().is_empty());
}

#[test]
fn test_second_parallel_execution_changes_nothing() {
    init_logging();
    let mut module = parse(PROGRAM);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload().parallel_offload(true).verbose(true));

    let first = pass.execute(&mut module, &session);
    let graph_after_first = module.print();
    let summaries_after_first = pass.dump(&module);

    let second = pass.execute(&mut module, &session);

    // helper, scale and host_only are cloned; main is rejected by the scan
    assert_eq!(first.clones.len(), 3);
    assert!(module.node_by_name("main.hsa.0").is_none());
    assert!(second.clones.is_empty());
    assert!(second.removed.is_empty());
    assert_eq!(second.redirected, 0);
    assert_eq!(module.print(), graph_after_first);
    assert_eq!(pass.dump(&module), summaries_after_first);
}

#[test]
fn test_universal_clone_mirrors_original_linkage() {
    let mut module = parse(
        r#"
u() [hsa_universal] local { entry: ret }
v() [hsa_universal] { entry: ret }
"#,
    );
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);
    assert_eq!(report.clones.len(), 2);

    let u = node(&module, "u");
    let u_clone = node(&module, "u.hsa.0");
    assert!(module.has_attribute(u, Attribute::OmpDeclareTarget));
    assert!(!module.decl_flags(u_clone).public);
    assert!(!module.node_flags(u_clone).force_output);

    let v = node(&module, "v");
    let v_clone = node(&module, "v.hsa.0");
    assert!(module.has_attribute(v, Attribute::OmpDeclareTarget));
    assert!(module.decl_flags(v_clone).public);
    assert!(module.node_flags(v_clone).force_output);

    let summaries = pass.summaries().unwrap();
    assert_eq!(summaries.get(u).kind, FunctionKind::Function);
    assert_eq!(summaries.get(v).bound_function, Some(v_clone));
}

const REJECTED_EXPLICIT: &str = r#"
v() [hsa_function] virtual { entry: ret }
w() [hsa_function] {
entry:
  %r = call @v() rso
  ret %r
}
"#;

#[test]
fn test_scan_rejection_overrides_explicit_marker() {
    init_logging();
    let mut module = parse(REJECTED_EXPLICIT);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload().parallel_offload(true).verbose(true));

    let report = pass.execute(&mut module, &session);

    assert!(report.clones.is_empty());
    assert!(module.node_by_name("v.hsa.0").is_none());
    assert!(module.node_by_name("w.hsa.0").is_none());

    let summaries = pass.summaries().unwrap();
    for name in ["v", "w"] {
        assert!(!summaries.get(node(&module, name)).is_participant(), "summary of {name}");
    }

    let messages: Vec<&str> = session.diagnostics().iter().map(|d| d.message).collect();
    assert_eq!(
        messages,
        vec![
            "Unable to prepare 'v' for HSA offloading (virtual function).",
            "Unable to prepare 'w' for HSA offloading (calls with return slot optimization).",
        ]
    );
}

#[test]
fn test_explicit_markers_honored_without_scan() {
    let mut module = parse(REJECTED_EXPLICIT);
    let arena = Bump::new();
    let session = PassSession::new(&arena);
    let mut pass = OffloadPass::new(offload());

    let report = pass.execute(&mut module, &session);

    assert_eq!(report.clones.len(), 2);
    assert!(session.diagnostics().is_empty());
}
