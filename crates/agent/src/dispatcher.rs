use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use serde_json::json;
use tracing::{debug, error, info};

use flowmaster_core::domain::actor::{ActorContext, EmployeeId, Role};
use flowmaster_core::domain::command::{CommandResult, ErrorKind};
use flowmaster_core::domain::intent::Intent;
use flowmaster_core::domain::parameters::ParameterSet;
use flowmaster_core::domain::transaction::{NewTransaction, Transaction, TransactionFilter};
use flowmaster_core::reports::period::{current_iso_week, DateRange};
use flowmaster_core::reports::{
    DailyReport, ManagementReport, MonthlyReport, WeeklyReport, YearlyReport,
};
use flowmaster_db::{EmployeeRepository, RepositoryError, TransactionRepository};

pub const DEMO_WRITE_REJECTION: &str = "示例账号只能查看，不能进行写操作。请使用实际账号登录。";
pub const MANAGER_ONLY: &str = "权限不足";
pub const NEEDS_MORE_INFORMATION: &str = "我理解您的需求，但需要更多信息";
pub const STORAGE_UNAVAILABLE: &str = "数据服务暂时不可用，请稍后重试。";

pub const QUERY_LIMIT: u32 = 50;
pub const MANAGEMENT_DEFAULT_DAYS: i64 = 30;

/// Early-exit carrier: the `Err` side is already the final result.
type Outcome = Result<CommandResult, CommandResult>;

/// Executes one classified intent against the stores.
///
/// Holds no per-request state; every call receives its own parameters and actor.
#[derive(Clone)]
pub struct CommandDispatcher {
    transactions: Arc<dyn TransactionRepository>,
    employees: Arc<dyn EmployeeRepository>,
}

impl CommandDispatcher {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        employees: Arc<dyn EmployeeRepository>,
    ) -> Self {
        Self { transactions, employees }
    }

    pub async fn dispatch(
        &self,
        intent: Intent,
        parameters: &ParameterSet,
        actor: &ActorContext,
    ) -> CommandResult {
        self.dispatch_on(intent, parameters, actor, Local::now().date_naive()).await
    }

    pub async fn dispatch_on(
        &self,
        intent: Intent,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> CommandResult {
        let outcome = match intent {
            Intent::CreateTransaction => self.create_transaction(parameters, actor, today).await,
            Intent::QueryTransactions => self.query_transactions(parameters, actor, today).await,
            Intent::DailyReport => self.daily_report(parameters, actor, today).await,
            Intent::WeeklyReport => self.weekly_report(parameters, actor, today).await,
            Intent::MonthlyReport => self.monthly_report(parameters, actor, today).await,
            Intent::YearlyReport => self.yearly_report(parameters, actor, today).await,
            Intent::ManagementReport => self.management_report(parameters, actor, today).await,
            Intent::EmployeeList => self.employee_list().await,
            Intent::Chat | Intent::Unknown => Ok(CommandResult::ok(NEEDS_MORE_INFORMATION, None)),
            Intent::SecurityBlocked => {
                Err(CommandResult::failed(ErrorKind::SecurityBlocked, "操作被安全系统拦截"))
            }
        };

        let result = outcome.unwrap_or_else(|failure| failure);
        if let Some(kind) = result.error_kind {
            info!(
                event_name = "agent.dispatch.failed",
                intent = intent.as_str(),
                user_id = actor.user_id.0,
                error_kind = kind.as_str(),
                "command rejected"
            );
        }
        result
    }

    async fn create_transaction(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        if actor.is_demo {
            return Err(CommandResult::failed(ErrorKind::Forbidden, DEMO_WRITE_REJECTION));
        }

        let mut resolved = parameters.clone();
        if actor.is_manager() {
            resolved.employee_id = self.resolve_employee(parameters, Intent::CreateTransaction).await?;
        }

        let missing = resolved.missing_for_create();
        let (Some(date), Some(employee_id), Some(quantity), Some(total_amount)) =
            (resolved.date, resolved.employee_id, resolved.quantity, resolved.total_amount)
        else {
            return Err(CommandResult::failed(
                ErrorKind::MissingParameters,
                format!("缺少必要参数：{}", describe_missing(&missing)),
            ));
        };

        if !actor.is_manager() && employee_id != actor.user_id {
            return Err(CommandResult::failed(ErrorKind::Forbidden, "您只能录入自己的数据"));
        }
        if actor.role == Role::Worker && date != today {
            return Err(CommandResult::failed(ErrorKind::Forbidden, "您只能录入当日数据"));
        }

        let employee = self
            .employees
            .find_by_id(employee_id)
            .await
            .map_err(|error| storage_failure(Intent::CreateTransaction, error))?;
        if !employee.is_some_and(|employee| employee.is_active) {
            return Err(CommandResult::failed(ErrorKind::InvalidInput, "员工不存在或已停用"));
        }

        let created = self
            .transactions
            .create(NewTransaction {
                date,
                employee_id,
                quantity,
                total_amount,
                amount_details: resolved.amount_details.unwrap_or_default(),
            })
            .await
            .map_err(|error| storage_failure(Intent::CreateTransaction, error))?;

        Ok(CommandResult::ok("流水记录创建成功", Some(json!(created))))
    }

    async fn query_transactions(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        let filter = if actor.is_manager() {
            let range = match (parameters.start_date, parameters.end_date, parameters.date) {
                (Some(start), Some(end), _) => Some(DateRange::new(start, end).ok_or_else(|| {
                    CommandResult::failed(ErrorKind::InvalidInput, "开始日期不能晚于结束日期")
                })?),
                (_, _, Some(date)) => Some(DateRange::single_day(date)),
                _ => None,
            };
            TransactionFilter {
                range,
                employee_id: self.employee_filter(parameters).await?,
                limit: Some(QUERY_LIMIT),
            }
        } else {
            TransactionFilter {
                range: Some(DateRange::single_day(today)),
                employee_id: Some(actor.user_id),
                limit: Some(QUERY_LIMIT),
            }
        };

        let transactions = self
            .transactions
            .query(&filter)
            .await
            .map_err(|error| storage_failure(Intent::QueryTransactions, error))?;

        Ok(CommandResult::ok(
            format!("已为您查询到{}条流水记录", transactions.len()),
            Some(json!({ "count": transactions.len(), "transactions": transactions })),
        ))
    }

    async fn daily_report(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        let (date, employee_id) = if actor.is_manager() {
            (parameters.date.unwrap_or(today), None)
        } else {
            (today, Some(actor.user_id))
        };

        let transactions = self
            .transactions
            .aggregate(DateRange::single_day(date), employee_id)
            .await
            .map_err(|error| storage_failure(Intent::DailyReport, error))?;

        let report = DailyReport::build(date, &transactions);
        Ok(CommandResult::ok(format!("已为您生成{date}日报"), Some(json!(report))))
    }

    async fn weekly_report(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        require_manager(actor)?;

        let (current_year, current_week) = current_iso_week(today);
        let year = parameters.year.unwrap_or(current_year);
        let week = parameters.week.unwrap_or(current_week);
        let range = DateRange::iso_week(year, week).ok_or_else(|| {
            CommandResult::failed(ErrorKind::InvalidInput, format!("{year}年没有第{week}周"))
        })?;

        let transactions = self.aggregate(range, Intent::WeeklyReport).await?;
        let report = WeeklyReport::build(year, week, range, &transactions);
        Ok(CommandResult::ok(format!("已为您生成{year}年第{week}周周报"), Some(json!(report))))
    }

    async fn monthly_report(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        require_manager(actor)?;

        let year = parameters.year.unwrap_or(today.year());
        let month = parameters.month.unwrap_or(today.month());
        let range = DateRange::month(year, month).ok_or_else(|| {
            CommandResult::failed(ErrorKind::InvalidInput, format!("无效的月份：{year}年{month}月"))
        })?;

        let transactions = self.aggregate(range, Intent::MonthlyReport).await?;
        let report = MonthlyReport::build(year, month, range, &transactions);
        Ok(CommandResult::ok(format!("已为您生成{year}年{month}月月报"), Some(json!(report))))
    }

    async fn yearly_report(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        require_manager(actor)?;

        let year = parameters.year.unwrap_or(today.year());
        let range = DateRange::year(year).ok_or_else(|| {
            CommandResult::failed(ErrorKind::InvalidInput, format!("无效的年份：{year}"))
        })?;

        let transactions = self.aggregate(range, Intent::YearlyReport).await?;
        let report = YearlyReport::build(year, range, &transactions);
        Ok(CommandResult::ok(format!("已为您生成{year}年年报"), Some(json!(report))))
    }

    async fn management_report(
        &self,
        parameters: &ParameterSet,
        actor: &ActorContext,
        today: NaiveDate,
    ) -> Outcome {
        require_manager(actor)?;

        let range = match (parameters.start_date, parameters.end_date) {
            (Some(start), Some(end)) => DateRange::new(start, end).ok_or_else(|| {
                CommandResult::failed(ErrorKind::InvalidInput, "开始日期不能晚于结束日期")
            })?,
            _ => DateRange::trailing(today, MANAGEMENT_DEFAULT_DAYS),
        };

        let current = self.aggregate(range, Intent::ManagementReport).await?;
        let previous = self.aggregate(range.preceding(), Intent::ManagementReport).await?;
        let report = ManagementReport::build(range, &current, &previous);

        Ok(CommandResult::ok(
            format!("已为您生成{}至{}管理报表", range.start, range.end),
            Some(json!(report)),
        ))
    }

    async fn employee_list(&self) -> Outcome {
        let employees = self
            .employees
            .list_active()
            .await
            .map_err(|error| storage_failure(Intent::EmployeeList, error))?;

        Ok(CommandResult::ok(
            "已为您查询员工列表",
            Some(json!({ "count": employees.len(), "employees": employees })),
        ))
    }

    async fn aggregate(
        &self,
        range: DateRange,
        intent: Intent,
    ) -> Result<Vec<Transaction>, CommandResult> {
        self.transactions.aggregate(range, None).await.map_err(|error| storage_failure(intent, error))
    }

    /// Read-side variant of [`Self::resolve_employee`]: a name that matches nobody is dropped
    /// and the query runs unfiltered.
    async fn employee_filter(
        &self,
        parameters: &ParameterSet,
    ) -> Result<Option<EmployeeId>, CommandResult> {
        match self.resolve_employee(parameters, Intent::QueryTransactions).await {
            Err(result) if result.is_kind(ErrorKind::InvalidInput) => {
                debug!(
                    event_name = "agent.dispatch.employee_filter_dropped",
                    intent = Intent::QueryTransactions.as_str(),
                    "employee name did not resolve; querying without an employee filter"
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Explicit id wins; otherwise a name is matched exactly against active employees.
    async fn resolve_employee(
        &self,
        parameters: &ParameterSet,
        intent: Intent,
    ) -> Result<Option<EmployeeId>, CommandResult> {
        if let Some(id) = parameters.employee_id {
            return Ok(Some(id));
        }
        let Some(name) = parameters.employee_name.as_deref() else {
            return Ok(None);
        };

        let employees =
            self.employees.list_active().await.map_err(|error| storage_failure(intent, error))?;
        employees
            .iter()
            .find(|employee| employee.answers_to(name))
            .map(|employee| Some(employee.id))
            .ok_or_else(|| CommandResult::failed(ErrorKind::InvalidInput, format!("未找到员工：{name}")))
    }
}

fn require_manager(actor: &ActorContext) -> Result<(), CommandResult> {
    if actor.is_manager() {
        Ok(())
    } else {
        Err(CommandResult::failed(ErrorKind::Forbidden, MANAGER_ONLY))
    }
}

fn storage_failure(intent: Intent, error: RepositoryError) -> CommandResult {
    error!(
        event_name = "agent.dispatch.storage_failure",
        intent = intent.as_str(),
        error = %error,
        "storage collaborator failed"
    );
    CommandResult::failed(ErrorKind::StorageFailure, STORAGE_UNAVAILABLE)
}

fn describe_missing(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| match *field {
            "date" => "日期",
            "employee_id" => "员工",
            "quantity" => "数量",
            "total_amount" => "总金额",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("、")
}
