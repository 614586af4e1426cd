// This module turns a selected Unit into machine code. Assembly is two passes over
// the unit's item stream: the first assigns byte offsets to every label and
// instruction, the second encodes each instruction through the token model with the
// register assignment supplied by the external allocator and records one
// Relocation per instruction that references a symbol, at that instruction's
// offset in the final stream. The literal pool follows the code at the target's
// pool alignment; address literals get an absolute relocation of their own.
// Nothing is resolved here, local branch targets included: the result lists every
// label as a symbol and leaves patching to the linker. ObjectWriter collects the
// machine code of several units into one ELF relocatable object using the object
// crate, one .text section, a global symbol per unit, local symbols per label and
// undefined symbols for externals.

//! Unit assembly and object file output.

use super::context::{Literal, Unit, UnitItem};
use super::error::{CodegenError, CodegenResult};
use super::register::RegisterAssignment;
use crate::codegen::target::Target;
use crate::encoding::relocation::Relocation;
use crate::encoding::syntax::RegisterNames;
use hashbrown::HashMap;
use object::write::{Object, StandardSection, Symbol, SymbolId, SymbolSection};
use object::{BinaryFormat, RelocationFlags, SymbolFlags, SymbolKind, SymbolScope};
use std::fmt::Write as _;

/// Visibility of a symbol in [`MachineCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    /// The unit's entry point.
    Global,
    /// Label or literal pool entry inside the unit.
    Local,
    /// Defined outside the unit.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDef {
    pub name: String,
    pub offset: u64,
    pub binding: SymbolBinding,
}

/// Bytes of one unit plus everything a linker needs to place them.
#[derive(Debug, Clone, Default)]
pub struct MachineCode {
    pub code: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub symbols: Vec<SymbolDef>,
}

impl MachineCode {
    pub fn symbol(&self, name: &str) -> Option<&SymbolDef> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

impl Unit {
    /// Encode the unit. Virtual registers are resolved through `regs`.
    pub fn assemble(&self, target: &dyn Target, regs: &dyn RegisterAssignment) -> CodegenResult<MachineCode> {
        let mut out = MachineCode::default();
        out.symbols.push(SymbolDef {
            name: self.name.clone(),
            offset: 0,
            binding: SymbolBinding::Global,
        });

        let mut offset = 0u64;
        for item in &self.items {
            match item {
                UnitItem::Label(name) => out.symbols.push(SymbolDef {
                    name: name.clone(),
                    offset,
                    binding: SymbolBinding::Local,
                }),
                UnitItem::Instruction(ins) => offset += ins.size() as u64,
            }
        }

        let align = target.pool_alignment().max(1) as u64;
        let pool_start = offset.div_ceil(align) * align;
        let mut pool_offset = pool_start;
        let mut pool_words = Vec::with_capacity(self.pool.len());
        for entry in &self.pool {
            let word = match &entry.literal {
                Literal::Int(value) => target.literal_word(*value)?,
                Literal::Address(symbol) => {
                    out.relocations.push(Relocation {
                        symbol: symbol.clone(),
                        offset: pool_offset,
                        kind: target.address_relocation(),
                        addend: 0,
                    });
                    target.literal_word(0)?
                }
            };
            out.symbols.push(SymbolDef {
                name: entry.label.clone(),
                offset: pool_offset,
                binding: SymbolBinding::Local,
            });
            pool_offset += word.len() as u64;
            pool_words.push(word);
        }

        for external in &self.externals {
            out.symbols.push(SymbolDef {
                name: external.clone(),
                offset: 0,
                binding: SymbolBinding::External,
            });
        }

        for item in &self.items {
            let UnitItem::Instruction(ins) = item else {
                continue;
            };
            let at = out.code.len() as u64;
            if let Some((symbol, decl)) = ins.relocation_target() {
                if !out.symbols.iter().any(|s| s.name == symbol) {
                    return Err(CodegenError::UnknownLabel {
                        name: symbol.to_string(),
                    });
                }
                out.relocations.push(Relocation {
                    symbol: symbol.to_string(),
                    offset: at,
                    kind: decl.kind,
                    addend: decl.addend,
                });
            }
            let bytes = ins.encode(regs)?;
            debug_assert_eq!(bytes.len(), ins.size());
            out.code.extend_from_slice(&bytes);
        }

        for entry in &self.pool {
            if !out.relocations.iter().any(|r| r.symbol == entry.label) {
                log::warn!("{}: pool entry {} is never loaded", self.name, entry.label);
            }
        }

        out.code.resize(pool_start as usize, 0);
        for word in pool_words {
            out.code.extend_from_slice(&word);
        }
        out.relocations.sort_by_key(|r| r.offset);

        log::debug!(
            "assembled {}: {} bytes, {} relocations",
            self.name,
            out.code.len(),
            out.relocations.len()
        );
        Ok(out)
    }

    /// Assembly listing, pool included.
    pub fn render(&self, names: &dyn RegisterNames) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}:", self.name);
        for item in &self.items {
            let _ = match item {
                UnitItem::Label(label) => writeln!(out, "{}:", label),
                UnitItem::Instruction(ins) => writeln!(out, "    {}", ins.render(names)),
            };
        }
        if !self.pool.is_empty() {
            let _ = writeln!(out, "    .align 4");
            for entry in &self.pool {
                let _ = writeln!(out, "{}:", entry.label);
                let _ = writeln!(out, "    .word {}", entry.literal);
            }
        }
        out
    }
}

/// Builds a relocatable object from assembled units.
pub struct ObjectWriter {
    obj: Object<'static>,
    externals: HashMap<String, SymbolId>,
    globals: HashMap<String, SymbolId>,
    pending: Vec<(u64, MachineCode)>,
}

impl ObjectWriter {
    pub fn new(target: &dyn Target) -> Self {
        let (arch, endian) = target.object_format();
        Self {
            obj: Object::new(BinaryFormat::Elf, arch, endian),
            externals: HashMap::new(),
            globals: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Append one unit's code to `.text` and define its symbols.
    pub fn add_unit(&mut self, code: MachineCode) -> CodegenResult<()> {
        let text = self.obj.section_id(StandardSection::Text);
        let base = self.obj.append_section_data(text, &code.code, 4);
        for def in code.symbols.iter().filter(|s| s.binding == SymbolBinding::Global) {
            if self.globals.contains_key(&def.name) {
                return Err(CodegenError::Object {
                    reason: format!("symbol `{}` defined twice", def.name),
                });
            }
            let id = self.obj.add_symbol(Symbol {
                name: def.name.as_bytes().to_vec(),
                value: base + def.offset,
                size: code.code.len() as u64,
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
            self.globals.insert(def.name.clone(), id);
        }
        self.pending.push((base, code));
        Ok(())
    }

    /// Emit relocations and serialize the object.
    pub fn finish(mut self) -> CodegenResult<Vec<u8>> {
        let text = self.obj.section_id(StandardSection::Text);
        for (base, code) in std::mem::take(&mut self.pending) {
            let mut locals: HashMap<&str, SymbolId> = HashMap::new();
            for def in code.symbols.iter().filter(|s| s.binding == SymbolBinding::Local) {
                let id = self.obj.add_symbol(Symbol {
                    name: def.name.as_bytes().to_vec(),
                    value: base + def.offset,
                    size: 0,
                    kind: SymbolKind::Label,
                    scope: SymbolScope::Compilation,
                    weak: false,
                    section: SymbolSection::Section(text),
                    flags: SymbolFlags::None,
                });
                locals.insert(def.name.as_str(), id);
            }

            for reloc in &code.relocations {
                let symbol = match locals.get(reloc.symbol.as_str()) {
                    Some(id) => *id,
                    None => self.global_or_external(&reloc.symbol),
                };
                self.obj
                    .add_relocation(
                        text,
                        object::write::Relocation {
                            offset: base + reloc.offset,
                            symbol,
                            addend: reloc.addend,
                            flags: RelocationFlags::Elf {
                                r_type: reloc.kind.elf_type,
                            },
                        },
                    )
                    .map_err(|err| CodegenError::Object {
                        reason: err.to_string(),
                    })?;
            }
        }
        self.obj.write().map_err(|err| CodegenError::Object {
            reason: err.to_string(),
        })
    }

    fn global_or_external(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.globals.get(name).or_else(|| self.externals.get(name)) {
            return *id;
        }
        let id = self.obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: 0,
            size: 0,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Undefined,
            flags: SymbolFlags::None,
        });
        self.externals.insert(name.to_string(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::registers::{reg, R0, R1};
    use crate::arm::{Arm, ArmOptions};
    use crate::core::context::CodeGenContext;
    use crate::core::register::NoAssignment;

    fn sample(arm: &Arm) -> Unit {
        let isa = arm.isa();
        let mut ctx = CodeGenContext::new(arm, "f", 0);
        ctx.place_label("entry");
        ctx.emit(isa.mov_reg(reg(R0), reg(R1)).unwrap());
        ctx.load_constant(reg(R1), Literal::Int(0x1234_5678)).unwrap();
        ctx.emit(isa.branch(&isa.bne, "exit").unwrap());
        ctx.place_label("exit");
        ctx.emit(isa.call("g").unwrap());
        ctx.declare_external("g");
        ctx.finish()
    }

    #[test]
    fn test_offsets_pool_and_relocations() {
        let _ = env_logger::builder().is_test(true).try_init();
        let arm = Arm::new(ArmOptions::default()).unwrap();
        let code = sample(&arm).assemble(&arm, &NoAssignment).unwrap();

        assert_eq!(code.code.len(), 20);
        assert_eq!(&code.code[0..4], &0xE1A0_0001u32.to_le_bytes());
        assert_eq!(&code.code[16..20], &0x1234_5678u32.to_le_bytes());
        assert_eq!(code.symbol("exit").unwrap().offset, 12);
        assert_eq!(code.symbol("f.lit0").unwrap().offset, 16);
        assert_eq!(code.symbol("g").unwrap().binding, SymbolBinding::External);

        let relocs: Vec<(u64, &str, &str)> = code
            .relocations
            .iter()
            .map(|r| (r.offset, r.kind.name, r.symbol.as_str()))
            .collect();
        assert_eq!(relocs, vec![(4, "ldr_imm12", "f.lit0"), (8, "imm24", "exit"), (12, "call24", "g")]);
    }

    #[test]
    fn test_unknown_branch_target() {
        let arm = Arm::new(ArmOptions::default()).unwrap();
        let mut ctx = CodeGenContext::new(&arm, "f", 0);
        ctx.emit(arm.isa().branch(&arm.isa().b, "nowhere").unwrap());
        let err = ctx.finish().assemble(&arm, &NoAssignment).unwrap_err();
        assert_eq!(err, CodegenError::UnknownLabel { name: "nowhere".to_string() });
    }

    #[test]
    fn test_render_listing() {
        let arm = Arm::new(ArmOptions::default()).unwrap();
        let listing = sample(&arm).render(arm.register_names());
        assert!(listing.starts_with("f:\nentry:\n    mov r0, r1\n"));
        assert!(listing.contains("    bne exit\n"));
        assert!(listing.ends_with("f.lit0:\n    .word 305419896\n"));
    }
}
