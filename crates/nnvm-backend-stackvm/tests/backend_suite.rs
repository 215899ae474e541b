use nnvm_backend_stackvm::{decode_text, disassemble, Instruction, SectionReader, StackvmModule};
use nnvm_backend_tests::define_backend_tests;
use nnvm_backend_tests::fixtures;
use nnvm_backend_tests::StackvmRunner;

define_backend_tests!(stackvm, StackvmRunner::new);

#[test]
fn decoded_records_reencode_to_identical_text() {
    let runner = StackvmRunner::new();
    for fixture in fixtures::all().expect("fixtures") {
        let module = runner.emit(&fixture.graph).expect("emit");
        let program = decode_text(module.text()).expect("decode");
        let mut writer = nnvm_backend_stackvm::SectionWriter::new();
        for instruction in &program {
            instruction.encode(&mut writer);
        }
        assert_eq!(writer.as_bytes(), module.text(), "{}", fixture.name);
    }
}

#[test]
fn every_record_names_a_known_function() {
    let runner = StackvmRunner::new();
    for fixture in fixtures::all().expect("fixtures") {
        let module = runner.emit(&fixture.graph).expect("emit");
        let listing = disassemble(module.text()).expect("disassemble");
        for instruction in decode_text(module.text()).expect("decode") {
            if let Instruction::Tensor(function) = instruction {
                assert!(listing.contains(function.name()), "{}: {}", fixture.name, function.name());
            }
        }
    }
}

#[test]
fn serialized_module_starts_with_container_header() {
    let fixture = fixtures::all()
        .expect("fixtures")
        .into_iter()
        .find(|fixture| fixture.name == "conv2d")
        .expect("conv2d fixture");
    let module = StackvmRunner::new().emit(&fixture.graph).expect("emit");
    let bytes = module.serialize().expect("serialize");
    let mut reader = SectionReader::new(&bytes);
    assert_eq!(reader.read_bytes(4).expect("magic"), b"NNVM");
    assert_eq!(reader.read_u32().expect("version"), 1);
    let kind = reader.read_bytes(16).expect("type");
    assert_eq!(&kind[..7], b"stackvm");
    assert!(kind[7..].iter().all(|byte| *byte == 0));
    assert_eq!(reader.read_u32().expect("sections"), 3);
    assert_eq!(StackvmModule::deserialize(&bytes).expect("deserialize"), module);
}
