//! Integration tests for the class file format

use umbra_bytecode::{
    access, decode_code, verify_class, ClassBuilder, ClassFile, ClassFileError, Instruction,
    MethodDescriptor, TypeDesc, VerifyError,
};

fn counter_class() -> ClassFile {
    ClassBuilder::new("demo.Counter")
        .extends("demo.Base")
        .field("count", "I", access::PRIVATE)
        .field("INSTANCES", "I", access::PUBLIC | access::STATIC)
        .method("<init>", "()V", access::PUBLIC, |code| {
            code.load_local(0)
                .invoke_special("demo.Base", "<init>", "()V")
                .emit(Instruction::ReturnVoid);
        })
        .method("increment", "(I)I", access::PUBLIC, |code| {
            code.load_local(0)
                .load_local(0)
                .get_field("demo.Counter", "count")
                .load_local(1)
                .emit(Instruction::Iadd)
                .put_field("demo.Counter", "count")
                .load_local(0)
                .get_field("demo.Counter", "count")
                .emit(Instruction::Return);
        })
        .build()
        .expect("class should assemble")
}

#[test]
fn test_encode_decode_preserves_class() {
    let class = counter_class();
    let bytes = class.encode();
    assert_eq!(&bytes[..4], b"UMBC");

    let decoded = ClassFile::decode(&bytes).expect("Failed to decode");
    assert_eq!(decoded, class);
    assert!(verify_class(&decoded).is_ok());
}

#[test]
fn test_encoding_is_deterministic() {
    assert_eq!(counter_class().encode(), counter_class().encode());
}

#[test]
fn test_method_code_decodes_to_instructions() {
    let class = counter_class();
    let method = class.find_method("increment", "(I)I").unwrap();
    let code = decode_code(&method.code).unwrap();
    assert_eq!(code.first(), Some(&Instruction::LoadLocal(0)));
    assert_eq!(code.last(), Some(&Instruction::Return));
    assert_eq!(method.max_locals, 2);
}

#[test]
fn test_corrupted_payload_is_rejected() {
    let mut bytes = counter_class().encode();
    let middle = bytes.len() / 2;
    bytes[middle] = bytes[middle].wrapping_add(1);
    assert!(matches!(
        ClassFile::decode(&bytes),
        Err(ClassFileError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = counter_class().encode();
    bytes[4] = 9;
    assert!(matches!(
        ClassFile::decode(&bytes),
        Err(ClassFileError::UnsupportedVersion(9))
    ));
}

#[test]
fn test_verifier_rejects_unterminated_method() {
    let class = ClassBuilder::new("demo.Bad")
        .method("loose", "()V", access::STATIC, |code| {
            code.const_i32(1).emit(Instruction::Pop);
        })
        .build()
        .unwrap();
    assert!(matches!(verify_class(&class), Err(VerifyError::FallOffEnd(_))));
}

#[test]
fn test_descriptor_names() {
    let desc = MethodDescriptor::parse("(TILdemo.Counter;[D)V").unwrap();
    assert_eq!(
        desc.param_type_names(),
        vec!["string", "int", "demo.Counter", "double[]"]
    );
    assert_eq!(desc.ret, TypeDesc::Void);
}
