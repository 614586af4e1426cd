//! ELF objects written from selected units, read back with `object`.

use bumpalo::Bump;
use isel::arm::registers::{GENERAL, R3};
use isel::arm::{Arm, ArmOptions};
use isel::core::{AsmReg, ObjectWriter, RegisterAssignment, VirtualReg};
use isel::ir::parser::parse_ir;
use isel::{select_function, Target};
use object::{Architecture, Object, ObjectSection, ObjectSymbol, RelocationFlags};

struct AllTo(AsmReg);

impl RegisterAssignment for AllTo {
    fn physical(&self, _reg: VirtualReg) -> Option<AsmReg> {
        Some(self.0)
    }
}

const SOURCE: &str = "\
function f
block entry
  MOVI32 r0(DIVI32(REGI32 %a, REGI32 %b))

function g
block entry
  MOVI32 r0(LABEL @f)
";

fn build() -> Vec<u8> {
    let arm = Arm::new(ArmOptions::default()).unwrap();
    let arena = Bump::new();
    let functions = parse_ir(SOURCE, &arena, arm.register_names(), GENERAL).unwrap();
    let mut writer = ObjectWriter::new(&arm);
    for function in &functions {
        let unit = select_function(&arm, function).unwrap();
        writer.add_unit(unit.assemble(&arm, &AllTo(R3)).unwrap()).unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn test_object_layout() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bytes = build();
    let file = object::File::parse(&*bytes).unwrap();
    assert_eq!(file.architecture(), Architecture::Arm);

    // f: five instructions; g: ldr, mov and one pool word
    let text = file.section_by_name(".text").unwrap();
    assert_eq!(text.size(), 20 + 12);

    let f = file.symbol_by_name("f").unwrap();
    assert!(f.is_global());
    assert_eq!(f.address(), 0);
    let g = file.symbol_by_name("g").unwrap();
    assert!(g.is_global());
    assert_eq!(g.address(), 20);

    let sdiv = file.symbol_by_name("__sdiv").unwrap();
    assert!(sdiv.is_undefined());
}

#[test]
fn test_object_relocations() {
    let bytes = build();
    let file = object::File::parse(&*bytes).unwrap();
    let text = file.section_by_name(".text").unwrap();

    let relocations: Vec<(u64, u32)> = text
        .relocations()
        .map(|(offset, reloc)| match reloc.flags() {
            RelocationFlags::Elf { r_type } => (offset, r_type),
            other => panic!("unexpected flags {:?}", other),
        })
        .collect();
    assert!(relocations.contains(&(8, object::elf::R_ARM_CALL)));
    assert!(relocations.contains(&(20, object::elf::R_ARM_PC13)));
    assert!(relocations.contains(&(28, object::elf::R_ARM_ABS32)));
    assert_eq!(relocations.len(), 3);
}
