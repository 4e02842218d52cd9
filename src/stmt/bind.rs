//! Statement parameters

use super::cursor::CursorLink;
use crate::{
    Error, Result,
    lob::LobSource,
    native::{BindSlot, Direction},
    types::{Codec, CursorId, ToValue, Value},
};
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindMode {
    Positional,
    Named,
}

/// Returns the unique parameter placeholder names in the order of their first appearance.
/// Quoted text, comments and PL/SQL assignments (`:=`) are skipped.
pub(crate) fn scan_placeholders(sql: &str) -> Vec<String> {
    let mut names : Vec<String> = Vec::new();
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                for (_, q) in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                for (_, e) in chars.by_ref() {
                    if e == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = ' ';
                for (_, e) in chars.by_ref() {
                    if prev == '*' && e == '/' {
                        break;
                    }
                    prev = e;
                }
            }
            ':' => {
                let start = match chars.peek() {
                    Some(&(ix, n)) if n.is_alphanumeric() || n == '_' => ix,
                    _ => continue,
                };
                let mut end = start;
                while let Some(&(ix, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '$' || n == '#' {
                        end = ix + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = sql[start..end].to_uppercase();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// Values bound to the statement parameter placeholders
pub struct Params {
    names: Vec<String>,
    idxs: HashMap<String, usize>,
    slots: Vec<Option<(Value, Direction)>>,
    mode: Option<BindMode>,
    named_depth: usize,
    plsql_arrays: bool,
    codec: Codec,
    lobs: Vec<(usize, LobSource)>,
    outs: HashMap<usize, Value>,
    links: HashMap<CursorId, Arc<CursorLink>>,
}

impl Params {
    pub(crate) fn new(sql: &str) -> Self {
        let names = scan_placeholders(sql);
        let idxs = names.iter().enumerate().map(|(ix, name)| (name.clone(), ix)).collect();
        let slots = vec![None; names.len()];
        Self {
            names, idxs, slots,
            mode: None,
            named_depth: 0,
            plsql_arrays: false,
            codec: Codec::default(),
            lobs: Vec::new(),
            outs: HashMap::new(),
            links: HashMap::new(),
        }
    }

    /// Clears previous binds before the next execution.
    pub(crate) fn reset(&mut self, codec: Codec, plsql_arrays: bool) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.mode = None;
        self.named_depth = 0;
        self.plsql_arrays = plsql_arrays;
        self.codec = codec;
        self.lobs.clear();
        self.outs.clear();
        self.links.clear();
    }

    /// Number of distinct placeholders
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Placeholder names without leading colons
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Conversion settings of the session and statement
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Returns the bind name without an optional leading colon
    fn strip_colon(name: &str) -> &str {
        name.strip_prefix(':').unwrap_or(name)
    }

    /// Returns index of the parameter placeholder.
    pub(crate) fn index_of(&self, name: &str) -> Result<usize> {
        // Assume `name` is already uppercase and use it as-is first.
        // Explicitly convert to uppercase only if as-is search fails.
        let name = Self::strip_colon(name);
        if let Some(&ix) = self.idxs.get(name) {
            Ok(ix)
        } else if let Some(&ix) = self.idxs.get(name.to_uppercase().as_str()) {
            Ok(ix)
        } else {
            Err(Error::OrdinalGap(format!("statement does not define parameter placeholder :{}", name)))
        }
    }

    /// Switches binding to named mode for the duration of a named argument.
    pub(crate) fn enter_named(&mut self) -> Result<()> {
        if self.mode == Some(BindMode::Positional) {
            return Err(Error::OrdinalGap("named and positional arguments cannot be mixed".to_string()));
        }
        self.mode = Some(BindMode::Named);
        self.named_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_named(&mut self) {
        self.named_depth = self.named_depth.saturating_sub(1);
    }

    fn check_position(&mut self, pos: usize) -> Result<()> {
        if self.named_depth == 0 {
            if self.mode == Some(BindMode::Named) {
                return Err(Error::OrdinalGap("named and positional arguments cannot be mixed".to_string()));
            }
            self.mode = Some(BindMode::Positional);
        }
        if pos >= self.names.len() {
            return Err(Error::OrdinalGap(format!("argument {} does not have a placeholder: statement has {}", pos + 1, self.names.len())));
        }
        Ok(())
    }

    /// Binds a value to the placeholder at `pos`.
    pub(crate) fn bind(&mut self, pos: usize, val: Value, dir: Direction) -> Result<()> {
        self.check_position(pos)?;
        if matches!(val, Value::Array(_)) && !self.plsql_arrays {
            return Err(Error::ArrayBindDisabled);
        }
        self.slots[pos] = Some((val, dir));
        Ok(())
    }

    /// Converts and binds an IN argument.
    pub(crate) fn bind_in<T: ToValue + ?Sized>(&mut self, pos: usize, val: &T) -> Result<()> {
        let val = val.to_value(&self.codec)?;
        self.bind(pos, val, Direction::In)
    }

    /// Converts and binds an IN/OUT argument.
    pub(crate) fn bind_inout<T: ToValue + ?Sized>(&mut self, pos: usize, val: &T) -> Result<()> {
        let val = val.to_value(&self.codec)?;
        self.bind(pos, val, Direction::InOut)
    }

    /// Binds a sequence of values as a PL/SQL index-by table.
    pub(crate) fn bind_array<T: ToValue>(&mut self, pos: usize, items: &[T], dir: Direction) -> Result<()> {
        self.check_position(pos)?;
        if !self.plsql_arrays {
            return Err(Error::ArrayBindDisabled);
        }
        let items = items.iter().map(|item| item.to_value(&self.codec)).collect::<Result<Vec<_>>>()?;
        self.slots[pos] = Some((Value::Array(items), dir));
        Ok(())
    }

    /// Binds a LOB source. Its content is written into a temporary LOB before the execution.
    pub(crate) fn bind_lob(&mut self, pos: usize, src: LobSource) -> Result<()> {
        self.check_position(pos)?;
        match src.into_direct() {
            Ok(val) => self.slots[pos] = Some((val, Direction::In)),
            Err(src) => {
                self.slots[pos] = Some((Value::Null, Direction::In));
                self.lobs.push((pos, src));
            }
        }
        Ok(())
    }

    /// Fails if some placeholders were left without arguments.
    pub(crate) fn check_complete(&self) -> Result<()> {
        if self.mode.is_none() {
            // nothing was bound, the server decides whether the statement needs arguments
            return Ok(());
        }
        match self.slots.iter().position(Option::is_none) {
            Some(ix) => Err(Error::OrdinalGap(format!("placeholder :{} is not bound", self.names[ix]))),
            None => Ok(()),
        }
    }

    pub(crate) fn take_lobs(&mut self) -> Vec<(usize, LobSource)> {
        std::mem::take(&mut self.lobs)
    }

    pub(crate) fn set_value(&mut self, pos: usize, val: Value) {
        if let Some(Some((slot, _))) = self.slots.get_mut(pos) {
            *slot = val;
        }
    }

    /// Returns the bound values in placeholder order
    pub(crate) fn slots(&self) -> Vec<BindSlot> {
        self.names.iter().zip(self.slots.iter()).map(|(name, slot)| {
            let (value, dir) = slot.clone().unwrap_or((Value::Null, Direction::In));
            BindSlot { name: name.clone(), value, dir }
        }).collect()
    }

    /// Stores values the server returned into OUT parameters.
    pub(crate) fn set_outs(&mut self, outs: Vec<(usize, Value)>) {
        for (pos, val) in outs {
            if let Value::Cursor(cursor) = &val {
                self.links.insert(cursor.id, CursorLink::new(cursor.id));
            }
            self.outs.insert(pos, val);
        }
    }

    /// Returns the value the server returned into the OUT parameter at `pos`.
    pub fn out_value(&self, pos: usize) -> Option<&Value> {
        self.outs.get(&pos)
    }

    pub(crate) fn cursor_link(&self, id: CursorId) -> Option<Arc<CursorLink>> {
        self.links.get(&id).cloned()
    }

    /// Hands cursors returned in OUT parameters over to the statement.
    pub(crate) fn take_links(&mut self) -> Vec<Arc<CursorLink>> {
        self.links.drain().map(|(_, link)| link).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders() {
        let names = scan_placeholders("
            BEGIN
                -- :not_this
                /* nor :this */
                :total := :a + :b + :A;
                SELECT ':quoted', \":ident\" INTO :v FROM dual WHERE x = :1;
            END;
        ");
        assert_eq!(names, ["TOTAL", "A", "B", "V", "1"]);
    }

    #[test]
    fn named_and_positional_do_not_mix() {
        let mut params = Params::new("SELECT :a, :b FROM dual");
        params.bind_in(0, &1).unwrap();
        assert!(matches!(params.enter_named(), Err(Error::OrdinalGap(_))));

        params.reset(Codec::default(), false);
        params.enter_named().unwrap();
        let ix = params.index_of(":B").unwrap();
        params.bind_in(ix, &2).unwrap();
        params.leave_named();
        assert!(matches!(params.bind_in(0, &1), Err(Error::OrdinalGap(_))));
    }

    #[test]
    fn positional_overflow_and_gaps() {
        let mut params = Params::new("SELECT :a, :b FROM dual");
        assert!(matches!(params.bind_in(2, &1), Err(Error::OrdinalGap(_))));

        params.reset(Codec::default(), false);
        params.bind_in(0, &1).unwrap();
        assert!(matches!(params.check_complete(), Err(Error::OrdinalGap(msg)) if msg.contains(":B")));
        assert!(matches!(params.index_of("c"), Err(Error::OrdinalGap(_))));
    }

    #[test]
    fn arrays_need_to_be_enabled() {
        let mut params = Params::new("BEGIN pkg.proc(:arr); END;");
        assert_eq!(params.bind_array(0, &[1, 2, 3], Direction::In), Err(Error::ArrayBindDisabled));
        params.reset(Codec::default(), true);
        params.bind_array(0, &[1, 2, 3], Direction::In).unwrap();
        assert_eq!(params.slots()[0].value, Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }
}
