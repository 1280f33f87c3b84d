use std::fmt::Write as _;

use pixur_types::Status;
use pixur_types::status::replace_or_suppress;

use crate::adapter::DbAdapter;
use crate::{Executor, Querier, Rows, Value};

/// Row lock requested by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lock {
    #[default]
    None,
    Read,
    Write,
}

/// Index descriptor: ordered columns plus the leading values supplied for them.
///
/// A unique descriptor identifies at most one row, and is the only kind
/// accepted as the key of an update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Idx {
    cols: &'static [&'static str],
    vals: Vec<Value>,
    unique: bool,
}

impl Idx {
    pub fn new(cols: &'static [&'static str], vals: Vec<Value>) -> Self {
        Self {
            cols,
            vals,
            unique: false,
        }
    }

    pub fn unique(cols: &'static [&'static str], vals: Vec<Value>) -> Self {
        Self {
            cols,
            vals,
            unique: true,
        }
    }

    pub fn cols(&self) -> &'static [&'static str] {
        self.cols
    }

    pub fn vals(&self) -> &[Value] {
        &self.vals
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// Scan options. Only `prefix` or a `start`/`stop` pair may be set.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub prefix: Option<Idx>,
    pub start: Option<Idx>,
    pub stop: Option<Idx>,
    pub lock: Lock,
    /// Flips ORDER BY only; bounds are never reinterpreted.
    pub reverse: bool,
    /// Zero means unlimited.
    pub limit: usize,
}

const ERR_COLS_VALS_MISMATCH: &str = "db: number of columns and values don't match";
const ERR_NO_COLS: &str = "db: no columns provided";
const ERR_NOT_UNIQUE: &str = "db: key is not a unique index";

/// Column holding the serialized row.
pub const DATA_COL: &str = "data";

struct ScanStmt<'a> {
    opts: &'a Opts,
    name: &'a str,
    adap: &'a dyn DbAdapter,
    buf: String,
    args: Vec<Value>,
}

/// Builds the SELECT for a scan and its positional arguments.
///
/// # Panics
///
/// If both a prefix and a range bound are set, or a descriptor carries more
/// values than columns. Both are programming errors.
pub fn build_scan(adap: &dyn DbAdapter, name: &str, opts: &Opts) -> (String, Vec<Value>) {
    let mut s = ScanStmt {
        opts,
        name,
        adap,
        buf: String::new(),
        args: Vec::new(),
    };
    s.build();
    (s.buf, s.args)
}

impl ScanStmt<'_> {
    fn build(&mut self) {
        let _ = write!(
            self.buf,
            "SELECT {} FROM {}",
            self.adap.quote(DATA_COL),
            self.adap.quote(self.name)
        );

        let opts = self.opts;
        if opts.prefix.is_some() && (opts.start.is_some() || opts.stop.is_some()) {
            panic!("only Prefix or Start|Stop may be specified");
        }
        if let Some(prefix) = &opts.prefix {
            self.append_prefix(prefix);
        } else if opts.start.is_some() || opts.stop.is_some() {
            self.append_range();
        }

        if opts.limit > 0 {
            let _ = write!(self.buf, " LIMIT {}", opts.limit);
        }
        self.adap.lock_stmt(&mut self.buf, opts.lock);
        self.buf.push(';');
    }

    fn append_prefix(&mut self, prefix: &Idx) {
        let (cols, vals) = (prefix.cols(), prefix.vals());
        check_arity(cols, vals);
        if !vals.is_empty() {
            self.buf.push_str(" WHERE ");
            for (i, (col, val)) in cols.iter().zip(vals).enumerate() {
                if i != 0 {
                    self.buf.push_str(" AND ");
                }
                let _ = write!(self.buf, "{} = ?", self.adap.quote(col));
                self.args.push(val.clone());
            }
        }
        let sort_cols = &cols[vals.len()..];
        if !sort_cols.is_empty() {
            self.append_order(sort_cols);
        }
    }

    fn append_range(&mut self) {
        let opts = self.opts;
        let start = opts.start.as_ref().filter(|i| !i.vals().is_empty());
        let stop = opts.stop.as_ref().filter(|i| !i.vals().is_empty());

        if start.is_some() || stop.is_some() {
            self.buf.push_str(" WHERE ");
        }
        if let Some(start) = start {
            let (stmt, args) = build_bound(start.cols(), start.vals(), Bound::Start, self.adap);
            self.buf.push_str(&stmt);
            self.args.extend(args);
        }
        if start.is_some() && stop.is_some() {
            self.buf.push_str(" AND ");
        }
        if let Some(stop) = stop {
            let (stmt, args) = build_bound(stop.cols(), stop.vals(), Bound::Stop, self.adap);
            self.buf.push_str(&stmt);
            self.args.extend(args);
        }

        let order_cols: &[&str] = match (&opts.start, &opts.stop) {
            (Some(start), _) if !start.cols().is_empty() => start.cols(),
            (_, Some(stop)) => stop.cols(),
            _ => &[],
        };
        if !order_cols.is_empty() {
            self.append_order(order_cols);
        }
    }

    fn append_order(&mut self, cols: &[&str]) {
        self.buf.push_str(" ORDER BY ");
        let order = if self.opts.reverse { " DESC" } else { " ASC" };
        for (i, col) in cols.iter().enumerate() {
            if i != 0 {
                self.buf.push_str(", ");
            }
            self.buf.push_str(&self.adap.quote(col));
            self.buf.push_str(order);
        }
    }
}

fn check_arity(cols: &[&str], vals: &[Value]) {
    if vals.len() > cols.len() {
        panic!("More vals than cols");
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    Stop,
}

// Disjunctive normal form. Only the last supplied column uses the boundary
// operator, every earlier term is a strict comparison.
//   start: ((A >= ?)), ((A > ?) OR (A = ? AND B >= ?)), ...
//   stop:  ((A < ?)),  ((A < ?) OR (A = ? AND B < ?)), ...
fn build_bound(
    cols: &[&str],
    vals: &[Value],
    bound: Bound,
    adap: &dyn DbAdapter,
) -> (String, Vec<Value>) {
    check_arity(cols, vals);
    let mut args = Vec::new();
    let mut ors = Vec::with_capacity(vals.len());
    for i in 0..vals.len() {
        let mut ands = Vec::with_capacity(i + 1);
        for k in 0..i {
            ands.push(format!("{} = ?", adap.quote(cols[k])));
            args.push(vals[k].clone());
        }
        let op = match bound {
            Bound::Start if i == vals.len() - 1 => ">=",
            Bound::Start => ">",
            Bound::Stop => "<",
        };
        ands.push(format!("{} {} ?", adap.quote(cols[i]), op));
        args.push(vals[i].clone());
        ors.push(format!("({})", ands.join(" AND ")));
    }
    (format!("({})", ors.join(" OR ")), args)
}

/// Runs a scan, handing each row's serialized data to `cb` in order.
///
/// The cursor is always closed; a close failure only surfaces if nothing
/// else failed first.
pub fn scan<Q, F>(
    q: &mut Q,
    adap: &dyn DbAdapter,
    name: &str,
    opts: &Opts,
    mut cb: F,
) -> Result<(), Status>
where
    Q: Querier + ?Sized,
    F: FnMut(&[u8]) -> Result<(), Status>,
{
    let (query, args) = build_scan(adap, name, opts);
    let mut rows = q.query(&query, &args)?;

    let mut stscap = drain(rows.as_mut(), &mut cb).err();
    if let Err(e) = rows.close() {
        replace_or_suppress(&mut stscap, e.into());
    }
    match stscap {
        Some(sts) => Err(sts),
        None => Ok(()),
    }
}

fn drain<F>(rows: &mut dyn Rows, cb: &mut F) -> Result<(), Status>
where
    F: FnMut(&[u8]) -> Result<(), Status>,
{
    while rows.next() {
        let row = rows.scan()?;
        match row.first() {
            Some(Value::Blob(data)) => cb(data.as_slice())?,
            Some(Value::Text(data)) => cb(data.as_bytes())?,
            _ => return Err(Status::internal("db: data column is not a blob")),
        }
    }
    if let Some(e) = rows.err() {
        return Err(Status::internal(e.to_string()).wrap("db: row iteration"));
    }
    Ok(())
}

fn check_cols_vals(cols: &[&str], vals: &[Value]) -> Result<(), Status> {
    if cols.len() != vals.len() {
        return Err(Status::invalid_argument(ERR_COLS_VALS_MISMATCH));
    }
    if cols.is_empty() {
        return Err(Status::invalid_argument(ERR_NO_COLS));
    }
    Ok(())
}

fn check_key(key: &Idx) -> Result<(), Status> {
    if !key.is_unique() {
        return Err(Status::invalid_argument(ERR_NOT_UNIQUE));
    }
    check_cols_vals(key.cols(), key.vals())
}

pub fn build_insert(
    adap: &dyn DbAdapter,
    name: &str,
    cols: &[&str],
    vals: &[Value],
) -> Result<String, Status> {
    check_cols_vals(cols, vals)?;
    let col_fmt = cols
        .iter()
        .map(|c| adap.quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let val_fmt = vec!["?"; vals.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({});",
        adap.quote(name),
        col_fmt,
        val_fmt
    ))
}

pub fn insert<E: Executor + ?Sized>(
    exec: &mut E,
    adap: &dyn DbAdapter,
    name: &str,
    cols: &[&str],
    vals: &[Value],
) -> Result<(), Status> {
    let query = build_insert(adap, name, cols, vals)?;
    exec.exec(&query, vals)?;
    Ok(())
}

pub fn build_delete(adap: &dyn DbAdapter, name: &str, key: &Idx) -> Result<String, Status> {
    check_key(key)?;
    Ok(format!(
        "DELETE FROM {} WHERE {};",
        adap.quote(name),
        eq_list(adap, key.cols(), " AND ")
    ))
}

pub fn delete<E: Executor + ?Sized>(
    exec: &mut E,
    adap: &dyn DbAdapter,
    name: &str,
    key: &Idx,
) -> Result<(), Status> {
    let query = build_delete(adap, name, key)?;
    exec.exec(&query, key.vals())?;
    Ok(())
}

pub fn build_update(
    adap: &dyn DbAdapter,
    name: &str,
    cols: &[&str],
    vals: &[Value],
    key: &Idx,
) -> Result<(String, Vec<Value>), Status> {
    check_cols_vals(cols, vals)?;
    check_key(key)?;

    let query = format!(
        "UPDATE {} SET {} WHERE {};",
        adap.quote(name),
        eq_list(adap, cols, ", "),
        eq_list(adap, key.cols(), " AND ")
    );
    let mut all_vals = Vec::with_capacity(vals.len() + key.vals().len());
    all_vals.extend_from_slice(vals);
    all_vals.extend_from_slice(key.vals());
    Ok((query, all_vals))
}

pub fn update<E: Executor + ?Sized>(
    exec: &mut E,
    adap: &dyn DbAdapter,
    name: &str,
    cols: &[&str],
    vals: &[Value],
    key: &Idx,
) -> Result<(), Status> {
    let (query, all_vals) = build_update(adap, name, cols, vals, key)?;
    exec.exec(&query, &all_vals)?;
    Ok(())
}

fn eq_list(adap: &dyn DbAdapter, cols: &[&str], sep: &str) -> String {
    cols.iter()
        .map(|c| format!("{} = ?", adap.quote(c)))
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mysql::MysqlAdapter;
    use crate::adapter::postgres::PostgresAdapter;
    use pixur_types::Code;

    const COLS: &[&str] = &["A", "B", "C"];

    fn ints(vs: &[i64]) -> Vec<Value> {
        vs.iter().map(|&v| Value::Int(v)).collect()
    }

    #[test]
    fn scan_whole_table() {
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &Opts::default());
        assert_eq!(q, "SELECT `data` FROM `Foo`;");
        assert!(args.is_empty());
    }

    #[test]
    fn prefix_scan_orders_remaining_cols() {
        let opts = Opts {
            prefix: Some(Idx::new(COLS, ints(&[1]))),
            ..Default::default()
        };
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &opts);
        assert_eq!(
            q,
            "SELECT `data` FROM `Foo` WHERE `A` = ? ORDER BY `B` ASC, `C` ASC;"
        );
        assert_eq!(args, ints(&[1]));
    }

    #[test]
    fn full_prefix_has_no_order() {
        let opts = Opts {
            prefix: Some(Idx::unique(COLS, ints(&[1, 2, 3]))),
            lock: Lock::Write,
            limit: 1,
            ..Default::default()
        };
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &opts);
        assert_eq!(
            q,
            "SELECT `data` FROM `Foo` WHERE `A` = ? AND `B` = ? AND `C` = ? LIMIT 1 FOR UPDATE;"
        );
        assert_eq!(args, ints(&[1, 2, 3]));
    }

    #[test]
    fn empty_prefix_sorts_by_all_cols() {
        let opts = Opts {
            prefix: Some(Idx::new(COLS, vec![])),
            reverse: true,
            ..Default::default()
        };
        let (q, _) = build_scan(&PostgresAdapter, "Foo", &opts);
        assert_eq!(
            q,
            r#"SELECT "data" FROM "Foo" ORDER BY "A" DESC, "B" DESC, "C" DESC;"#
        );
    }

    #[test]
    fn start_one_col() {
        let opts = Opts {
            start: Some(Idx::new(COLS, ints(&[1]))),
            ..Default::default()
        };
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &opts);
        assert_eq!(
            q,
            "SELECT `data` FROM `Foo` WHERE ((`A` >= ?)) ORDER BY `A` ASC, `B` ASC, `C` ASC;"
        );
        assert_eq!(args, ints(&[1]));
    }

    #[test]
    fn start_three_cols() {
        let opts = Opts {
            start: Some(Idx::new(COLS, ints(&[1, 2, 3]))),
            ..Default::default()
        };
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &opts);
        assert_eq!(
            q,
            "SELECT `data` FROM `Foo` WHERE ((`A` > ?) OR (`A` = ? AND `B` > ?) OR \
             (`A` = ? AND `B` = ? AND `C` >= ?)) ORDER BY `A` ASC, `B` ASC, `C` ASC;"
        );
        assert_eq!(args, ints(&[1, 1, 2, 1, 2, 3]));
    }

    #[test]
    fn stop_two_cols_reverse() {
        let opts = Opts {
            stop: Some(Idx::new(COLS, ints(&[4, 5]))),
            reverse: true,
            lock: Lock::Read,
            ..Default::default()
        };
        let (q, args) = build_scan(&MysqlAdapter, "Foo", &opts);
        assert_eq!(
            q,
            "SELECT `data` FROM `Foo` WHERE ((`A` < ?) OR (`A` = ? AND `B` < ?)) \
             ORDER BY `A` DESC, `B` DESC, `C` DESC LOCK IN SHARE MODE;"
        );
        assert_eq!(args, ints(&[4, 4, 5]));
    }

    #[test]
    fn start_and_stop() {
        let opts = Opts {
            start: Some(Idx::new(COLS, ints(&[1]))),
            stop: Some(Idx::new(COLS, ints(&[3]))),
            limit: 10,
            ..Default::default()
        };
        let (q, args) = build_scan(&PostgresAdapter, "Foo", &opts);
        assert_eq!(
            q,
            r#"SELECT "data" FROM "Foo" WHERE (("A" >= ?)) AND (("A" < ?)) ORDER BY "A" ASC, "B" ASC, "C" ASC LIMIT 10;"#
        );
        assert_eq!(args, ints(&[1, 3]));
    }

    #[test]
    #[should_panic(expected = "only Prefix or Start|Stop may be specified")]
    fn prefix_and_range_panics() {
        let opts = Opts {
            prefix: Some(Idx::new(COLS, ints(&[1]))),
            stop: Some(Idx::new(COLS, ints(&[3]))),
            ..Default::default()
        };
        build_scan(&MysqlAdapter, "Foo", &opts);
    }

    #[test]
    #[should_panic(expected = "More vals than cols")]
    fn too_many_vals_panics() {
        let opts = Opts {
            start: Some(Idx::new(&["A"], ints(&[1, 2]))),
            ..Default::default()
        };
        build_scan(&MysqlAdapter, "Foo", &opts);
    }

    #[test]
    fn insert_statement() {
        let q = build_insert(&MysqlAdapter, "Foo", &["A", "B"], &ints(&[1, 2])).unwrap();
        assert_eq!(q, "INSERT INTO `Foo` (`A`, `B`) VALUES (?, ?);");
    }

    #[test]
    fn insert_rejects_mismatch_and_empty() {
        let err = build_insert(&MysqlAdapter, "Foo", &["A", "B"], &ints(&[1])).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        let err = build_insert(&MysqlAdapter, "Foo", &[], &[]).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), ERR_NO_COLS);
    }

    #[test]
    fn update_statement_appends_key_args() {
        let key = Idx::unique(&["A", "B"], ints(&[7, 8]));
        let (q, args) =
            build_update(&MysqlAdapter, "Foo", &["C", "data"], &ints(&[1, 2]), &key).unwrap();
        assert_eq!(
            q,
            "UPDATE `Foo` SET `C` = ?, `data` = ? WHERE `A` = ? AND `B` = ?;"
        );
        assert_eq!(args, ints(&[1, 2, 7, 8]));
    }

    #[test]
    fn update_and_delete_need_unique_full_key() {
        let loose = Idx::new(&["A"], ints(&[1]));
        let err = build_delete(&MysqlAdapter, "Foo", &loose).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let partial = Idx::unique(&["A", "B"], ints(&[1]));
        let err = build_update(&MysqlAdapter, "Foo", &["C"], &ints(&[1]), &partial).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), ERR_COLS_VALS_MISMATCH);
    }

    #[test]
    fn delete_statement() {
        let key = Idx::unique(&["A", "B"], ints(&[7, 8]));
        let q = build_delete(&PostgresAdapter, "Foo", &key).unwrap();
        assert_eq!(q, r#"DELETE FROM "Foo" WHERE "A" = ? AND "B" = ?;"#);
    }
}
